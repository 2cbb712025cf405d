use std::env;
use std::time::Duration;

/// Parses the port number from environment variables.
/// Checks PORT first, then AUTOUR_BACKEND_PORT, defaulting to 3001.
/// Returns an error if the port value is invalid.
pub fn parse_port() -> anyhow::Result<u16> {
    let port_str = env::var("PORT")
        .or_else(|_| env::var("AUTOUR_BACKEND_PORT"))
        .unwrap_or_else(|_| "3001".to_string());
    port_str.parse::<u16>().map_err(|e| {
        anyhow::anyhow!(
            "Invalid port value '{}': {}. Port must be a number between 1 and 65535",
            port_str,
            e
        )
    })
}

pub fn database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:autour.db".to_string())
}

/// Which upstream nearby-POIs provider the ExternalFetcher talks to.
/// Configurable rather than hard-coded, since either provider satisfies
/// the same coverage-bitmap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GooglePlaces,
    Overpass,
}

pub fn provider() -> Provider {
    match env::var("AUTOUR_PROVIDER").as_deref() {
        Ok("overpass") => Provider::Overpass,
        _ => Provider::GooglePlaces,
    }
}

pub fn google_places_api_key() -> String {
    env::var("GOOGLE_PLACES_API_KEY").unwrap_or_default()
}

pub fn geocode_api_key() -> String {
    env::var("GEOCODE_API_KEY").unwrap_or_default()
}

pub fn apple_shared_secret() -> String {
    env::var("APPLE_SHARED_SECRET").unwrap_or_default()
}

/// Outbound HTTP timeout for ExternalFetcher/geocode/receipt calls.
pub fn upstream_timeout() -> Duration {
    let secs = env::var("AUTOUR_UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    Duration::from_secs(secs)
}

/// Trial credit grant amount for first-ever `/get-trial-credits` call.
pub const TRIAL_CREDITS: i64 = 5;

/// Maximum quadrant-split recursion depth, bounding worst-case per-cell
/// fetch work when a provider keeps saturating its page limit.
pub const MAX_QUADRANT_SPLIT_DEPTH: u32 = 8;
