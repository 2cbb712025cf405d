//! Persistent storage for zones, subzones, areas (with coverage bitmap),
//! places, user credits and the purchase ledger. All operations that can
//! race are implemented as idempotent upserts.

use crate::db::{query_with_timeout, DbQueryError};
use crate::grid;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use ts_rs::TS;

const ZONE_BOOTSTRAP_CONCURRENCY: usize = 8;
const PLACE_FRESHNESS_DAYS: i64 = 7;
/// Keeps bulk inserts under SQLite's default bound parameter limit.
const AREA_INSERT_CHUNK_ROWS: usize = 200;

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct Place {
    pub place_id: i64,
    pub formatted_address: String,
    pub google_maps_uri: String,
    pub primary_type: String,
    pub display_name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub current_opening_hours: String,
    pub country_id: i64,
    pub area_id: i64,
    pub last_updated: String,
}

#[derive(Debug, Clone)]
pub struct NewPlace {
    pub formatted_address: String,
    pub google_maps_uri: String,
    pub primary_type: String,
    pub display_name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub current_opening_hours: String,
    pub country_id: i64,
    pub area_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AreaRow {
    pub subzone_id: i64,
    pub x: i32,
    pub y: i32,
    pub bitmap: i64,
}

/// `bootstrap()`: insert all 60*20 = 1,200 zones if none exist. Each
/// (number, band) pair is independent, so the inserts fan out over a
/// bounded worker pool (concurrency 8).
pub async fn bootstrap_zones(pool: &SqlitePool) -> Result<(), DbQueryError> {
    let existing: i64 = query_with_timeout(
        sqlx::query_scalar("SELECT COUNT(*) FROM zones").fetch_one(pool),
    )
    .await?;

    if existing > 0 {
        return Ok(());
    }

    tracing::info!("Bootstrapping UTM zones");

    let pairs: Vec<(i32, char)> = (1..=60)
        .flat_map(|n| grid::LAT_BANDS.chars().map(move |b| (n, b)))
        .collect();

    stream::iter(pairs)
        .map(|(number, band)| async move {
            query_with_timeout(
                sqlx::query("INSERT OR IGNORE INTO zones (z_number, z_band) VALUES (?, ?)")
                    .bind(number)
                    .bind(band.to_string())
                    .execute(pool),
            )
            .await
        })
        .buffer_unordered(ZONE_BOOTSTRAP_CONCURRENCY)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    Ok(())
}

/// `countryId(token)`: match by `nicename` OR `iso3`; 0 when absent.
pub async fn country_id(pool: &SqlitePool, token: &str) -> Result<i64, DbQueryError> {
    let id: Option<i64> = query_with_timeout(
        sqlx::query_scalar("SELECT id FROM countries WHERE nicename = ? OR iso3 = ?")
            .bind(token)
            .bind(token)
            .fetch_optional(pool),
    )
    .await?;
    Ok(id.unwrap_or(0))
}

pub async fn get_zone_id(
    pool: &SqlitePool,
    number: i32,
    band: char,
) -> Result<Option<i64>, DbQueryError> {
    let id: Option<i64> = query_with_timeout(
        sqlx::query_scalar("SELECT z_id FROM zones WHERE z_number = ? AND z_band = ?")
            .bind(number)
            .bind(band.to_string())
            .fetch_optional(pool),
    )
    .await?;
    Ok(id)
}

pub async fn get_subzone_by_coords(
    pool: &SqlitePool,
    lon: i32,
    lat: i32,
) -> Result<Option<i64>, DbQueryError> {
    let id: Option<i64> = query_with_timeout(
        sqlx::query_scalar(
            "SELECT subz_id FROM subzones WHERE subz_longitude = ? AND subz_latitude = ?",
        )
        .bind(lon)
        .bind(lat)
        .fetch_optional(pool),
    )
    .await?;
    Ok(id)
}

pub async fn get_subzone_by_id(
    pool: &SqlitePool,
    subzone_id: i64,
) -> Result<Option<(i32, i32)>, DbQueryError> {
    let row = query_with_timeout(
        sqlx::query("SELECT subz_longitude, subz_latitude FROM subzones WHERE subz_id = ?")
            .bind(subzone_id)
            .fetch_optional(pool),
    )
    .await?;

    Ok(row.map(|r| (r.get::<i32, _>(0), r.get::<i32, _>(1))))
}

/// `insertSubzone`: idempotent on the (lon, lat) uniqueness constraint — a
/// lost race to create the same subzone reuses the extant row rather than
/// erroring.
pub async fn insert_subzone(
    pool: &SqlitePool,
    lon: i32,
    lat: i32,
    zone_id: i64,
) -> Result<i64, DbQueryError> {
    query_with_timeout(
        sqlx::query(
            "INSERT OR IGNORE INTO subzones (subz_longitude, subz_latitude, subz_zone) VALUES (?, ?, ?)",
        )
        .bind(lon)
        .bind(lat)
        .bind(zone_id)
        .execute(pool),
    )
    .await?;

    let id = get_subzone_by_coords(pool, lon, lat)
        .await?
        .expect("subzone row must exist immediately after insert-or-ignore");
    Ok(id)
}

/// `insertAreas`: bulk-insert all 64*128 = 8,192 area rows for a subzone,
/// batched to stay under SQLite's bound-parameter ceiling. Idempotent via
/// `INSERT OR IGNORE` on (subzone, x, y) so a concurrent duplicate call is
/// harmless.
pub async fn insert_areas(pool: &SqlitePool, subzone_id: i64) -> Result<(), DbQueryError> {
    let mut coords = Vec::with_capacity(
        (grid::AREAS_PER_SUBZONE_X * grid::AREAS_PER_SUBZONE_Y) as usize,
    );
    for x in 0..grid::AREAS_PER_SUBZONE_X {
        for y in 0..grid::AREAS_PER_SUBZONE_Y {
            coords.push((x, y));
        }
    }

    let mut tx = query_with_timeout(pool.begin()).await?;
    for chunk in coords.chunks(AREA_INSERT_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT OR IGNORE INTO areas (area_subzone, area_x, area_y, area_covered) ",
        );
        qb.push_values(chunk, |mut b, (x, y)| {
            b.push_bind(subzone_id)
                .push_bind(*x as i64)
                .push_bind(*y as i64)
                .push_bind(0_i64);
        });
        query_with_timeout(qb.build().execute(&mut *tx)).await?;
    }
    query_with_timeout(tx.commit()).await?;

    Ok(())
}

pub async fn get_area_id_by_coords(
    pool: &SqlitePool,
    subzone_lon: i32,
    subzone_lat: i32,
    x: u32,
    y: u32,
) -> Result<Option<i64>, DbQueryError> {
    let id: Option<i64> = query_with_timeout(
        sqlx::query_scalar(
            "SELECT a.area_id FROM areas a
             JOIN subzones s ON a.area_subzone = s.subz_id
             WHERE s.subz_longitude = ? AND s.subz_latitude = ? AND a.area_x = ? AND a.area_y = ?",
        )
        .bind(subzone_lon)
        .bind(subzone_lat)
        .bind(x as i64)
        .bind(y as i64)
        .fetch_optional(pool),
    )
    .await?;
    Ok(id)
}

pub async fn get_area_by_id(
    pool: &SqlitePool,
    area_id: i64,
) -> Result<Option<AreaRow>, DbQueryError> {
    let row = query_with_timeout(
        sqlx::query("SELECT area_subzone, area_x, area_y, area_covered FROM areas WHERE area_id = ?")
            .bind(area_id)
            .fetch_optional(pool),
    )
    .await?;

    Ok(row.map(|r| AreaRow {
        subzone_id: r.get(0),
        x: r.get(1),
        y: r.get(2),
        bitmap: r.get(3),
    }))
}

pub async fn get_area_bitmap(pool: &SqlitePool, area_id: i64) -> Result<i64, DbQueryError> {
    let bitmap: i64 = query_with_timeout(
        sqlx::query_scalar("SELECT area_covered FROM areas WHERE area_id = ?")
            .bind(area_id)
            .fetch_one(pool),
    )
    .await?;
    Ok(bitmap)
}

pub async fn set_area_bitmap(
    pool: &SqlitePool,
    area_id: i64,
    bitmap: i64,
) -> Result<(), DbQueryError> {
    query_with_timeout(
        sqlx::query("UPDATE areas SET area_covered = ? WHERE area_id = ?")
            .bind(bitmap)
            .bind(area_id)
            .execute(pool),
    )
    .await?;
    Ok(())
}

/// `upsertPlace`: insert by unique `formatted_address`; on conflict, refresh
/// the other columns only when the existing row is older than 7 days.
pub async fn upsert_place(pool: &SqlitePool, place: &NewPlace) -> Result<(), DbQueryError> {
    let now = Utc::now();
    let cutoff = (now - chrono::Duration::days(PLACE_FRESHNESS_DAYS)).to_rfc3339();
    let now_str = now.to_rfc3339();

    query_with_timeout(
        sqlx::query(
            "INSERT INTO places (
                place_formatted_address, place_google_maps_uri, place_primary_type,
                place_display_name, place_longitude, place_latitude,
                place_current_opening_hours, place_country, place_area_id, last_updated
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (place_formatted_address) DO UPDATE SET
                place_google_maps_uri = excluded.place_google_maps_uri,
                place_primary_type = excluded.place_primary_type,
                place_display_name = excluded.place_display_name,
                place_longitude = excluded.place_longitude,
                place_latitude = excluded.place_latitude,
                place_current_opening_hours = excluded.place_current_opening_hours,
                place_country = excluded.place_country,
                place_area_id = excluded.place_area_id,
                last_updated = excluded.last_updated
             WHERE places.last_updated < ?",
        )
        .bind(&place.formatted_address)
        .bind(&place.google_maps_uri)
        .bind(&place.primary_type)
        .bind(&place.display_name)
        .bind(place.longitude)
        .bind(place.latitude)
        .bind(&place.current_opening_hours)
        .bind(place.country_id)
        .bind(place.area_id)
        .bind(&now_str)
        .bind(&cutoff)
        .execute(pool),
    )
    .await?;

    Ok(())
}

/// `placesForAreas`: union of places across the enumerated cells, filtered
/// by `primary_type ∈ included_types`.
pub async fn places_for_areas(
    pool: &SqlitePool,
    area_ids: &[i64],
    included_types: &[String],
) -> Result<Vec<Place>, DbQueryError> {
    if area_ids.is_empty() || included_types.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT place_id, place_formatted_address, place_google_maps_uri, place_primary_type,
                place_display_name, place_longitude, place_latitude,
                place_current_opening_hours, place_country, place_area_id, last_updated
         FROM places WHERE place_area_id IN (",
    );
    {
        let mut sep = qb.separated(", ");
        for id in area_ids {
            sep.push_bind(*id);
        }
    }
    qb.push(") AND place_primary_type IN (");
    {
        let mut sep = qb.separated(", ");
        for t in included_types {
            sep.push_bind(t);
        }
    }
    qb.push(")");

    let rows = query_with_timeout(qb.build().fetch_all(pool)).await?;

    Ok(rows
        .into_iter()
        .map(|r| Place {
            place_id: r.get(0),
            formatted_address: r.get(1),
            google_maps_uri: r.get(2),
            primary_type: r.get(3),
            display_name: r.get(4),
            longitude: r.get(5),
            latitude: r.get(6),
            current_opening_hours: r.get(7),
            country_id: r.get(8),
            area_id: r.get(9),
            last_updated: r.get(10),
        })
        .collect())
}

// --- Credit ledger -------------------------------------------------------

pub async fn get_credits(pool: &SqlitePool, user_id: &str) -> Result<i64, DbQueryError> {
    let credits: Option<i64> = query_with_timeout(
        sqlx::query_scalar("SELECT credits FROM user_credits WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool),
    )
    .await?;
    Ok(credits.unwrap_or(0))
}

pub async fn has_credits(pool: &SqlitePool, user_id: &str) -> Result<bool, DbQueryError> {
    Ok(get_credits(pool, user_id).await? > 0)
}

/// `setTrialCredits`: idempotent grant-once of the trial amount.
pub async fn set_trial_credits(
    pool: &SqlitePool,
    user_id: &str,
    amount: i64,
) -> Result<i64, DbQueryError> {
    query_with_timeout(
        sqlx::query(
            "INSERT INTO user_credits (user_id, credits, trial_granted) VALUES (?, ?, 1)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(amount)
        .execute(pool),
    )
    .await?;

    get_credits(pool, user_id).await
}

/// `decCredits`: decrement, never going below zero.
pub async fn dec_credits(pool: &SqlitePool, user_id: &str) -> Result<(), DbQueryError> {
    query_with_timeout(
        sqlx::query("UPDATE user_credits SET credits = credits - 1 WHERE user_id = ? AND credits > 0")
            .bind(user_id)
            .execute(pool),
    )
    .await?;
    Ok(())
}

pub async fn inc_credits(pool: &SqlitePool, user_id: &str, amount: i64) -> Result<(), DbQueryError> {
    query_with_timeout(
        sqlx::query(
            "INSERT INTO user_credits (user_id, credits) VALUES (?, ?)
             ON CONFLICT (user_id) DO UPDATE SET credits = credits + excluded.credits",
        )
        .bind(user_id)
        .bind(amount)
        .execute(pool),
    )
    .await?;
    Ok(())
}

/// Records a purchase keyed on the Apple transaction id, returning `true` if
/// this is the first time that transaction has been seen. A replayed
/// transaction id is ignored rather than inserted again.
pub async fn insert_purchase(
    pool: &SqlitePool,
    user_id: &str,
    credits: i64,
    transaction_id: &str,
) -> Result<bool, DbQueryError> {
    let result = query_with_timeout(
        sqlx::query(
            "INSERT OR IGNORE INTO purchases (user_id, credits, transaction_id, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(credits)
        .bind(transaction_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool),
    )
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn zone_bootstrap_is_idempotent() {
        let pool = test_pool().await;
        bootstrap_zones(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM zones")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1200);

        bootstrap_zones(&pool).await.unwrap();
        let count_again: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM zones")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count_again, 1200);
    }

    #[tokio::test]
    async fn subzone_and_areas_are_created_lazily_and_idempotently() {
        let pool = test_pool().await;
        bootstrap_zones(&pool).await.unwrap();
        let zone_id = get_zone_id(&pool, 31, 'U').await.unwrap().unwrap();

        let subz_id = insert_subzone(&pool, 2, 48, zone_id).await.unwrap();
        insert_areas(&pool, subz_id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM areas WHERE area_subzone = ?")
            .bind(subz_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 8192);

        // Re-insertion must not duplicate rows (idempotent on (subzone,x,y)).
        let subz_id_2 = insert_subzone(&pool, 2, 48, zone_id).await.unwrap();
        assert_eq!(subz_id, subz_id_2);
        insert_areas(&pool, subz_id).await.unwrap();
        let count_again: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM areas WHERE area_subzone = ?")
            .bind(subz_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count_again, 8192);
    }

    #[tokio::test]
    async fn credits_never_go_negative() {
        let pool = test_pool().await;
        dec_credits(&pool, "nobody").await.unwrap();
        assert_eq!(get_credits(&pool, "nobody").await.unwrap(), 0);

        inc_credits(&pool, "alice", 1).await.unwrap();
        dec_credits(&pool, "alice").await.unwrap();
        dec_credits(&pool, "alice").await.unwrap();
        assert_eq!(get_credits(&pool, "alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn trial_grant_is_idempotent() {
        let pool = test_pool().await;
        let first = set_trial_credits(&pool, "bob", 5).await.unwrap();
        assert_eq!(first, 5);
        let second = set_trial_credits(&pool, "bob", 5).await.unwrap();
        assert_eq!(second, 5);
    }

    #[tokio::test]
    async fn place_uniqueness_on_formatted_address() {
        let pool = test_pool().await;
        bootstrap_zones(&pool).await.unwrap();
        let zone_id = get_zone_id(&pool, 31, 'U').await.unwrap().unwrap();
        let subz_id = insert_subzone(&pool, 2, 48, zone_id).await.unwrap();
        insert_areas(&pool, subz_id).await.unwrap();
        let area_id = get_area_id_by_coords(&pool, 2, 48, 22, 109)
            .await
            .unwrap()
            .unwrap();

        let place = NewPlace {
            formatted_address: "1 Rue de Rivoli, Paris France".into(),
            google_maps_uri: "".into(),
            primary_type: "museum".into(),
            display_name: "Louvre".into(),
            longitude: 2.3522,
            latitude: 48.8566,
            current_opening_hours: "".into(),
            country_id: 0,
            area_id,
        };
        upsert_place(&pool, &place).await.unwrap();
        upsert_place(&pool, &place).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
