//! End-to-end CoverageEngine test against an in-memory SQLite DB, driven
//! through a mock `ExternalFetcher` instead of a real provider.

use async_trait::async_trait;
use autour::error::CoreError;
use autour::fetcher::{ExternalFetcher, RawPlace};
use autour::{coverage, store};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingFetcher {
    calls: Arc<AtomicUsize>,
    page_limit: usize,
    results_per_call: usize,
}

#[async_trait]
impl ExternalFetcher for CountingFetcher {
    async fn fetch_circle(
        &self,
        _center_lat: f64,
        _center_lon: f64,
        _radius_m: f64,
        _included_types: &[String],
    ) -> Result<Vec<RawPlace>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.results_per_call)
            .map(|i| RawPlace {
                formatted_address: format!("{i} Coverage Ave Paris France"),
                google_maps_uri: String::new(),
                primary_type: "museum".to_string(),
                display_name: "Test Place".to_string(),
                longitude: 2.3522,
                latitude: 48.8566,
                current_opening_hours: String::new(),
            })
            .collect())
    }

    fn page_limit(&self) -> usize {
        self.page_limit
    }
}

async fn fresh_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    store::bootstrap_zones(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn cell_coverage_is_idempotent_across_repeated_queries() {
    let pool = fresh_pool().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = CountingFetcher {
        calls: calls.clone(),
        page_limit: 20,
        results_per_call: 3,
    };

    let fetch_types = vec!["museum".to_string()];
    let filter_types = vec!["museum".to_string()];

    let first = coverage::get_places(
        &pool,
        &fetcher,
        48.8566,
        2.3522,
        0,
        0,
        &fetch_types,
        &filter_types,
        8,
    )
    .await
    .unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second = coverage::get_places(
        &pool,
        &fetcher,
        48.8566,
        2.3522,
        0,
        0,
        &fetch_types,
        &filter_types,
        8,
    )
    .await
    .unwrap();

    // Bitmap bit is already set; the second query must not touch the provider.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.len(), first.len());
    assert_eq!(
        second
            .iter()
            .map(|p| &p.formatted_address)
            .collect::<std::collections::HashSet<_>>(),
        first
            .iter()
            .map(|p| &p.formatted_address)
            .collect::<std::collections::HashSet<_>>()
    );
}

#[tokio::test]
async fn quadrant_split_terminates_at_the_depth_cap() {
    let pool = fresh_pool().await;
    let calls = Arc::new(AtomicUsize::new(0));
    // Every call returns exactly `page_limit` results, so every cell keeps
    // saturating and splitting until `max_split_depth` is reached.
    let fetcher = CountingFetcher {
        calls: calls.clone(),
        page_limit: 2,
        results_per_call: 2,
    };

    let fetch_types = vec!["museum".to_string()];
    let filter_types = vec!["museum".to_string()];
    let max_split_depth = 2;

    coverage::get_places(
        &pool,
        &fetcher,
        48.8566,
        2.3522,
        0,
        1,
        &fetch_types,
        &filter_types,
        max_split_depth,
    )
    .await
    .unwrap();

    // One cell, recursing: depth 0 (1 call) + depth 1 (4 calls) + depth 2
    // (16 calls), then depth == max_split_depth stops further splitting.
    let expected: usize = (0..=max_split_depth).map(|d| 4usize.pow(d)).sum();
    assert_eq!(calls.load(Ordering::SeqCst), expected);
}

#[tokio::test]
async fn upstream_failure_is_swallowed_per_cell() {
    struct FailingFetcher;

    #[async_trait]
    impl ExternalFetcher for FailingFetcher {
        async fn fetch_circle(
            &self,
            _center_lat: f64,
            _center_lon: f64,
            _radius_m: f64,
            _included_types: &[String],
        ) -> Result<Vec<RawPlace>, CoreError> {
            Err(CoreError::Upstream {
                status: 503,
                body: "provider down".to_string(),
            })
        }

        fn page_limit(&self) -> usize {
            20
        }
    }

    let pool = fresh_pool().await;
    let fetch_types = vec!["museum".to_string()];
    let filter_types = vec!["museum".to_string()];

    // A failing provider must not fail the whole query; it just yields no
    // places for the unresolved cell.
    let places = coverage::get_places(
        &pool,
        &FailingFetcher,
        48.8566,
        2.3522,
        0,
        2,
        &fetch_types,
        &filter_types,
        8,
    )
    .await
    .unwrap();

    assert!(places.is_empty());

    let center = autour::grid::resolve(48.8566, 2.3522).unwrap();
    let area_id = store::get_area_id_by_coords(
        &pool,
        center.subzone_lon,
        center.subzone_lat,
        center.area_x,
        center.area_y,
    )
    .await
    .unwrap()
    .unwrap();
    let bitmap = store::get_area_bitmap(&pool, area_id).await.unwrap();
    assert_eq!(bitmap & (1 << 2), 0, "bit must stay unset after a swallowed upstream failure");
}
