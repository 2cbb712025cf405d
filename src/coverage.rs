//! CoverageEngine: resolves a nearby-places query into a spiral ring of
//! grid cells, lazily fills each cell's cache against the external
//! provider (recursing into quadrants on saturation), and aggregates the
//! union of places stored for the touched areas.

use crate::error::CoreError;
use crate::fetcher::ExternalFetcher;
use crate::grid::{self, PointInfo};
use crate::store::{self, Place};
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;

/// Caps how many rings a requested radius can expand to, bounding
/// worst-case per-query cell count the same way quadrant-split recursion
/// is depth-capped.
pub const MAX_EXPANSION_LEVEL: u32 = 25;

/// Converts a requested circle radius (meters) into a Chebyshev expansion
/// level: the smallest N whose (2N+1)^2 ring covers a circle of that
/// radius, using the requested center's own cell dimensions. Bridges the
/// HTTP layer's radius-based request to GridResolver's cell-count model
/// (see DESIGN.md).
pub fn expansion_level_for_radius(
    center_lat: f64,
    center_lon: f64,
    radius_m: f64,
) -> Result<u32, CoreError> {
    let center = grid::resolve(center_lat, center_lon).map_err(|e| CoreError::Domain(e.to_string()))?;
    let cell_width_km = grid::lon_delta_km(
        center.area_center_lat,
        center.area_center_lon - grid::AREA_WIDTH / 2.0,
        center.area_center_lon + grid::AREA_WIDTH / 2.0,
    );
    let cell_height_km = grid::lat_delta_km(
        center.area_center_lat - grid::AREA_HEIGHT / 2.0,
        center.area_center_lat + grid::AREA_HEIGHT / 2.0,
        center.area_center_lon,
    );
    let cell_km = cell_width_km.min(cell_height_km).max(1e-9);
    let radius_km = radius_m / 1000.0;
    let level = (radius_km / cell_km).ceil().max(1.0) as u32;
    Ok(level.min(MAX_EXPANSION_LEVEL))
}

/// `enumerateCells`: center cell plus every ring out to `expansion_level`,
/// walked top/bottom/left/right per ring so a ring of index i contributes
/// 8*i cells and the whole walk totals (2N+1)^2.
pub fn enumerate_cells(
    center: PointInfo,
    expansion_level: u32,
) -> Result<Vec<PointInfo>, CoreError> {
    let mut cells = Vec::with_capacity(((2 * expansion_level + 1).pow(2)) as usize);
    cells.push(center);

    for i in 1..=expansion_level as i64 {
        for j in -i..=i {
            cells.push(offset_cell(center, j, i)?);
            cells.push(offset_cell(center, j, -i)?);
        }
        for j in -(i - 1)..=(i - 1) {
            cells.push(offset_cell(center, -i, j)?);
            cells.push(offset_cell(center, i, j)?);
        }
    }

    Ok(cells)
}

fn offset_cell(center: PointInfo, dx: i64, dy: i64) -> Result<PointInfo, CoreError> {
    let lon = center.area_center_lon + dx as f64 * grid::AREA_WIDTH;
    let lat = center.area_center_lat + dy as f64 * grid::AREA_HEIGHT;
    grid::resolve(lat, lon).map_err(|e| CoreError::Domain(e.to_string()))
}

/// Radius (meters) of the circle that fully covers a `width` x `height`
/// degree rectangle centered at (center_lat, center_lon): the larger of
/// the east-west and north-south half-diagonal geodesic distances,
/// rounded to one decimal of a kilometer.
fn cell_radius_meters(center_lat: f64, center_lon: f64, width: f64, height: f64) -> f64 {
    let west = center_lon - width / 2.0;
    let east = center_lon + width / 2.0;
    let south = center_lat - height / 2.0;
    let north = center_lat + height / 2.0;

    let lon_km = grid::lon_delta_km(center_lat, west, east);
    let lat_km = grid::lat_delta_km(south, north, center_lon);
    let radius_km = lon_km.max(lat_km);

    ((radius_km * 10.0).round() / 10.0) * 1000.0
}

/// Fetches a rectangle from the provider, recursing into 4 equal
/// sub-rectangles when the result count saturates the provider's page
/// limit, up to `max_depth`. Each quadrant's center is the parent center
/// translated by (+-width/2, +-height/2).
fn fetch_rect<'a>(
    fetcher: &'a dyn ExternalFetcher,
    center_lat: f64,
    center_lon: f64,
    width: f64,
    height: f64,
    included_types: &'a [String],
    depth: u32,
    max_depth: u32,
) -> Pin<Box<dyn Future<Output = Result<Vec<crate::fetcher::RawPlace>, CoreError>> + Send + 'a>> {
    Box::pin(async move {
        let radius_m = cell_radius_meters(center_lat, center_lon, width, height);
        let results = fetcher
            .fetch_circle(center_lat, center_lon, radius_m, included_types)
            .await?;

        if results.len() < fetcher.page_limit() || depth >= max_depth {
            return Ok(results);
        }

        tracing::debug!(depth, "provider page saturated, splitting quadrant");

        let half_w = width / 2.0;
        let half_h = height / 2.0;
        let mut merged = Vec::new();
        for (sx, sy) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
            let sub_lon = center_lon + sx * half_w;
            let sub_lat = center_lat + sy * half_h;
            merged.extend(
                fetch_rect(
                    fetcher,
                    sub_lat,
                    sub_lon,
                    half_w,
                    half_h,
                    included_types,
                    depth + 1,
                    max_depth,
                )
                .await?,
            );
        }
        Ok(merged)
    })
}

/// Guarantees the cell's subzone and areas exist, fetches from the
/// provider on a bitmap miss, and persists what comes back. Storage
/// failures propagate (the whole query fails); an upstream fetch failure
/// for this one cell is logged and swallowed so the cell's bit stays
/// unset rather than aborting the rest of the query.
async fn ensure_cell_resolved(
    pool: &SqlitePool,
    fetcher: &dyn ExternalFetcher,
    cell: &PointInfo,
    category_bit: u8,
    fetch_types: &[String],
    max_split_depth: u32,
) -> Result<i64, CoreError> {
    let subzone_id = match store::get_subzone_by_coords(pool, cell.subzone_lon, cell.subzone_lat)
        .await?
    {
        Some(id) => id,
        None => {
            let zone_id = store::get_zone_id(pool, cell.zone, cell.band)
                .await?
                .ok_or_else(|| {
                    CoreError::Storage(format!(
                        "zone {} {} missing; bootstrap_zones was not run",
                        cell.zone, cell.band
                    ))
                })?;
            let id = store::insert_subzone(pool, cell.subzone_lon, cell.subzone_lat, zone_id)
                .await?;
            store::insert_areas(pool, id).await?;
            id
        }
    };

    let area_id = store::get_area_id_by_coords(
        pool,
        cell.subzone_lon,
        cell.subzone_lat,
        cell.area_x,
        cell.area_y,
    )
    .await?
    .ok_or_else(|| {
        CoreError::Storage(format!(
            "area ({}, {}) missing from subzone {} after insert_areas",
            cell.area_x, cell.area_y, subzone_id
        ))
    })?;

    let bitmap = store::get_area_bitmap(pool, area_id).await?;
    let bit = 1i64 << category_bit;
    if bitmap & bit != 0 {
        return Ok(area_id);
    }

    let fetched = fetch_rect(
        fetcher,
        cell.area_center_lat,
        cell.area_center_lon,
        grid::AREA_WIDTH,
        grid::AREA_HEIGHT,
        fetch_types,
        0,
        max_split_depth,
    )
    .await;

    match fetched {
        Ok(raw_places) => {
            for raw in raw_places {
                let country_id = store::country_id(pool, raw.country_token().unwrap_or(""))
                    .await?;
                let new_place = raw.into_new_place(area_id, country_id);
                store::upsert_place(pool, &new_place).await?;
            }
            store::set_area_bitmap(pool, area_id, bitmap | bit).await?;
        }
        Err(CoreError::Upstream { status, body }) => {
            tracing::warn!(status, body, "external fetch failed for area {area_id}, skipping");
        }
        Err(other) => return Err(other),
    }

    Ok(area_id)
}

/// `getPlaces`: resolve the center point, enumerate the expansion ring,
/// fill any cache misses concurrently, then return the union of stored
/// places for the touched areas filtered to `filter_types`.
///
/// `fetch_types` and `filter_types` serve different purposes: `fetch_types`
/// (the category's own provider-specific type list, see
/// `categories::Category::google_included_types`/`osm_amenity_types`) scopes
/// what's actually asked of the external provider, so that the bitmap bit
/// being set for `category_bit` accurately reflects what was fetched;
/// `filter_types` is the caller's requested `includedTypes` and narrows the
/// final result set.
#[allow(clippy::too_many_arguments)]
pub async fn get_places(
    pool: &SqlitePool,
    fetcher: &dyn ExternalFetcher,
    center_lat: f64,
    center_lon: f64,
    expansion_level: u32,
    category_bit: u8,
    fetch_types: &[String],
    filter_types: &[String],
    max_split_depth: u32,
) -> Result<Vec<Place>, CoreError> {
    let center = grid::resolve(center_lat, center_lon).map_err(|e| CoreError::Domain(e.to_string()))?;
    let cells = enumerate_cells(center, expansion_level)?;

    let area_ids: Vec<i64> = futures::future::try_join_all(cells.iter().map(|cell| {
        ensure_cell_resolved(pool, fetcher, cell, category_bit, fetch_types, max_split_depth)
    }))
    .await?;

    store::places_for_areas(pool, &area_ids, filter_types)
        .await
        .map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cell_enumeration_is_just_the_center() {
        let center = grid::resolve(48.8566, 2.3522).unwrap();
        let cells = enumerate_cells(center, 0).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0], center);
    }

    #[test]
    fn ring_counts_match_two_n_plus_one_squared() {
        let center = grid::resolve(48.8566, 2.3522).unwrap();
        for n in 0..=3u32 {
            let cells = enumerate_cells(center, n).unwrap();
            assert_eq!(cells.len(), ((2 * n + 1) * (2 * n + 1)) as usize);
        }
    }

    #[test]
    fn ring_cells_are_distinct() {
        let center = grid::resolve(48.8566, 2.3522).unwrap();
        let cells = enumerate_cells(center, 2).unwrap();
        let mut seen = std::collections::HashSet::new();
        for c in &cells {
            let key = (c.zone, c.band as u32, c.subzone_lon, c.subzone_lat, c.area_x, c.area_y);
            assert!(seen.insert(key), "duplicate cell {:?}", key);
        }
    }

    #[test]
    fn expansion_level_grows_with_radius() {
        let small = expansion_level_for_radius(48.8566, 2.3522, 200.0).unwrap();
        let large = expansion_level_for_radius(48.8566, 2.3522, 20_000.0).unwrap();
        assert!(small >= 1);
        assert!(large > small);
        assert!(large <= MAX_EXPANSION_LEVEL);
    }

    #[test]
    fn cell_radius_grows_with_rectangle_size() {
        let small = cell_radius_meters(48.0, 2.0, grid::AREA_WIDTH, grid::AREA_HEIGHT);
        let large = cell_radius_meters(48.0, 2.0, grid::AREA_WIDTH * 4.0, grid::AREA_HEIGHT * 4.0);
        assert!(large > small);
        assert!(small > 0.0);
    }
}
