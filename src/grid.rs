//! Pure spatial partitioning: GPS point -> UTM zone/band -> 1x1 degree
//! subzone -> 64x128 fine cell ("area"). No I/O.

use geo::{Geodesic, Distance, Point};

pub const LAT_BANDS: &str = "CDEFGHJKLMNPQRSTUVWX";
pub const AREA_WIDTH: f64 = 1.0 / 64.0;
pub const AREA_HEIGHT: f64 = 1.0 / 128.0;
pub const AREAS_PER_SUBZONE_X: u32 = 64;
pub const AREAS_PER_SUBZONE_Y: u32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("latitude {0} out of range [-80, 84]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("zone number {0} out of range [1, 60]")]
    ZoneOutOfRange(i32),
    #[error("invalid latitude band '{0}'")]
    InvalidBand(char),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneBounds {
    pub west_lon: f64,
    pub east_lon: f64,
    pub south_lat: f64,
    pub north_lat: f64,
}

/// The cell a GPS point resolves to, plus the cell's absolute center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointInfo {
    pub zone: i32,
    pub band: char,
    pub subzone_lon: i32,
    pub subzone_lat: i32,
    pub area_x: u32,
    pub area_y: u32,
    pub area_center_lon: f64,
    pub area_center_lat: f64,
}

fn check_lat_lon(lat: f64, lon: f64) -> Result<(), DomainError> {
    if !(-80.0..=84.0).contains(&lat) {
        return Err(DomainError::LatitudeOutOfRange(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(DomainError::LongitudeOutOfRange(lon));
    }
    Ok(())
}

/// `utmZoneOf`: resolve the (zone, band) pair a GPS point falls in, including
/// the standard UTM exceptions for band X (Svalbard) and band V (Norway).
pub fn utm_zone_of(lat: f64, lon: f64) -> Result<(i32, char), DomainError> {
    check_lat_lon(lat, lon)?;

    let mut zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;

    let band = if lat >= 72.0 {
        'X'
    } else {
        let idx = ((lat + 80.0) / 8.0).floor() as usize;
        LAT_BANDS.as_bytes()[idx.min(LAT_BANDS.len() - 1)] as char
    };

    if band == 'X' && (72.0..84.0).contains(&lat) {
        zone = if (9.0..21.0).contains(&lon) {
            31
        } else if (21.0..33.0).contains(&lon) {
            33
        } else if (33.0..42.0).contains(&lon) {
            35
        } else if lon >= 42.0 {
            37
        } else {
            zone
        };
    }

    if band == 'V' && (56.0..64.0).contains(&lat) {
        if (3.0..12.0).contains(&lon) {
            zone = 32;
        } else if (0.0..3.0).contains(&lon) {
            zone = 31;
        }
    }

    Ok((zone, band))
}

/// `zoneBounds`: the geographic rectangle a (zone, band) pair covers.
pub fn zone_bounds(zone: i32, band: char) -> Result<ZoneBounds, DomainError> {
    if !(1..=60).contains(&zone) {
        return Err(DomainError::ZoneOutOfRange(zone));
    }
    if !LAT_BANDS.contains(band) {
        return Err(DomainError::InvalidBand(band));
    }

    let central_meridian = f64::from(zone - 1) * 6.0 - 180.0 + 3.0;
    let (south_lat, north_lat) = latitude_band_bounds(band)?;

    Ok(ZoneBounds {
        west_lon: central_meridian - 3.0,
        east_lon: central_meridian + 3.0,
        south_lat,
        north_lat,
    })
}

fn latitude_band_bounds(band: char) -> Result<(f64, f64), DomainError> {
    let idx = LAT_BANDS.find(band).ok_or(DomainError::InvalidBand(band))?;
    let south = -80.0 + (idx as f64) * 8.0;
    Ok((south, south + 8.0))
}

/// `resolve`: GPS point -> (zone, band, subzone, area), plus the area's
/// absolute center coordinate.
pub fn resolve(lat: f64, lon: f64) -> Result<PointInfo, DomainError> {
    let (zone, band) = utm_zone_of(lat, lon)?;

    let subzone_lon = lon.floor() as i32;
    let subzone_lat = lat.floor() as i32;

    let frac_lon = lon - lon.floor();
    let frac_lat = lat - lat.floor();

    let area_x = (frac_lon * f64::from(AREAS_PER_SUBZONE_X)).floor() as u32;
    let area_y = (frac_lat * f64::from(AREAS_PER_SUBZONE_Y)).floor() as u32;

    let area_center_lon = f64::from(subzone_lon) + (f64::from(area_x) + 0.5) * AREA_WIDTH;
    let area_center_lat = f64::from(subzone_lat) + (f64::from(area_y) + 0.5) * AREA_HEIGHT;

    Ok(PointInfo {
        zone,
        band,
        subzone_lon,
        subzone_lat,
        area_x: area_x.min(AREAS_PER_SUBZONE_X - 1),
        area_y: area_y.min(AREAS_PER_SUBZONE_Y - 1),
        area_center_lon,
        area_center_lat,
    })
}

/// Geodesic distance in km between two points at the same latitude, one
/// `lon_a` degrees and one `lon_b` degrees east. Delegates to `geo`'s
/// geodesic distance rather than reimplementing great-circle math.
pub fn lon_delta_km(lat: f64, lon_a: f64, lon_b: f64) -> f64 {
    let a = Point::new(lon_a, lat);
    let b = Point::new(lon_b, lat);
    Geodesic.distance(a, b) / 1000.0
}

/// Geodesic distance in km between two points at the same longitude.
pub fn lat_delta_km(lat_a: f64, lat_b: f64, lon: f64) -> f64 {
    let a = Point::new(lon, lat_a);
    let b = Point::new(lon, lat_b);
    Geodesic.distance(a, b) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_paris() {
        let info = resolve(48.8566, 2.3522).unwrap();
        assert_eq!(info.zone, 31);
        assert_eq!(info.band, 'U');
        assert_eq!(info.subzone_lon, 2);
        assert_eq!(info.subzone_lat, 48);
        assert_eq!(info.area_x, 22);
        assert_eq!(info.area_y, 109);
    }

    #[test]
    fn norway_exception() {
        let (zone, band) = utm_zone_of(58.0, 5.0).unwrap();
        assert_eq!(zone, 32);
        assert_eq!(band, 'V');
    }

    #[test]
    fn norway_narrowing_exception() {
        let (zone, band) = utm_zone_of(58.0, 2.0).unwrap();
        assert_eq!(zone, 31);
        assert_eq!(band, 'V');
    }

    #[test]
    fn band_x_exception() {
        let (zone, band) = utm_zone_of(78.0, 15.0).unwrap();
        assert_eq!(zone, 33);
        assert_eq!(band, 'X');
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(matches!(
            utm_zone_of(85.0, 0.0),
            Err(DomainError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(matches!(
            utm_zone_of(0.0, 200.0),
            Err(DomainError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn zone_bounds_reject_bad_zone() {
        assert!(matches!(
            zone_bounds(0, 'U'),
            Err(DomainError::ZoneOutOfRange(_))
        ));
        assert!(matches!(
            zone_bounds(61, 'U'),
            Err(DomainError::ZoneOutOfRange(_))
        ));
    }

    #[test]
    fn zone_bounds_reject_bad_band() {
        assert!(matches!(
            zone_bounds(31, 'I'),
            Err(DomainError::InvalidBand(_))
        ));
    }

    #[test]
    fn tiling_is_a_partition() {
        // SW corner reconstructed from (subzone, area) resolves back to the
        // same (area_x, area_y) when re-resolved at the cell's own center.
        let info = resolve(48.8566, 2.3522).unwrap();
        let sw_lon = f64::from(info.subzone_lon) + f64::from(info.area_x) * AREA_WIDTH;
        let sw_lat = f64::from(info.subzone_lat) + f64::from(info.area_y) * AREA_HEIGHT;
        let reresolved = resolve(sw_lat + AREA_HEIGHT / 2.0, sw_lon + AREA_WIDTH / 2.0).unwrap();
        assert_eq!(reresolved.area_x, info.area_x);
        assert_eq!(reresolved.area_y, info.area_y);
        assert_eq!(reresolved.subzone_lon, info.subzone_lon);
        assert_eq!(reresolved.subzone_lat, info.subzone_lat);
    }

    #[test]
    fn area_center_roundtrips() {
        let info = resolve(40.0, 10.0).unwrap();
        let reresolved = resolve(info.area_center_lat, info.area_center_lon).unwrap();
        assert_eq!(reresolved.area_x, info.area_x);
        assert_eq!(reresolved.area_y, info.area_y);
    }

    #[test]
    fn lon_delta_km_is_symmetric() {
        let d1 = lon_delta_km(48.0, 2.0, 2.1);
        let d2 = lon_delta_km(48.0, 2.1, 2.0);
        assert!((d1 - d2).abs() < 1e-6);
        assert!(d1 > 0.0);
    }
}
