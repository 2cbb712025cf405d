//! Adapter over an upstream nearby-POIs provider. Translates a circular
//! query to the provider's wire format and returns a flat, normalised list.

use crate::error::CoreError;
use crate::store::NewPlace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GOOGLE_PAGE_LIMIT: usize = 20;
pub const OVERPASS_RESULT_LIMIT: usize = 50_000;

/// A place as returned by an upstream provider, normalised to the core's
/// Place attributes. Missing fields default to empty/zero rather than
/// carrying a dynamic JSON shape into the core.
#[derive(Debug, Clone, Default)]
pub struct RawPlace {
    pub formatted_address: String,
    pub google_maps_uri: String,
    pub primary_type: String,
    pub display_name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub current_opening_hours: String,
}

impl RawPlace {
    pub fn country_token(&self) -> Option<&str> {
        self.formatted_address.split_whitespace().last()
    }

    pub fn into_new_place(self, area_id: i64, country_id: i64) -> NewPlace {
        NewPlace {
            formatted_address: self.formatted_address,
            google_maps_uri: self.google_maps_uri,
            primary_type: self.primary_type,
            display_name: self.display_name,
            longitude: self.longitude,
            latitude: self.latitude,
            current_opening_hours: self.current_opening_hours,
            country_id,
            area_id,
        }
    }
}

#[async_trait]
pub trait ExternalFetcher: Send + Sync {
    /// `fetchCircle(center_lat, center_lon, radius_m, included_types)`.
    async fn fetch_circle(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
        included_types: &[String],
    ) -> Result<Vec<RawPlace>, CoreError>;

    /// The provider's page/result limit, used by CoverageEngine to detect
    /// saturation and trigger a quadrant split.
    fn page_limit(&self) -> usize;
}

// --- Google Places v1 "searchNearby" ------------------------------------

#[derive(Serialize)]
struct GLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize)]
struct GCircle {
    center: GLocation,
    radius: f64,
}

#[derive(Serialize)]
struct GLocationRestriction {
    circle: GCircle,
}

#[derive(Serialize)]
struct GSearchNearbyRequest {
    #[serde(rename = "includedTypes")]
    included_types: Vec<String>,
    #[serde(rename = "rankPreference")]
    rank_preference: String,
    #[serde(rename = "locationRestriction")]
    location_restriction: GLocationRestriction,
}

#[derive(Debug, Deserialize, Default)]
struct GDisplayName {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct GLocationResp {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Deserialize, Default)]
struct GPlace {
    #[serde(default, rename = "formattedAddress")]
    formatted_address: String,
    #[serde(default, rename = "googleMapsUri")]
    google_maps_uri: String,
    #[serde(default, rename = "primaryType")]
    primary_type: String,
    #[serde(default, rename = "displayName")]
    display_name: GDisplayName,
    #[serde(default)]
    location: GLocationResp,
    #[serde(default, rename = "currentOpeningHours")]
    current_opening_hours: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
struct GSearchNearbyResponse {
    #[serde(default)]
    places: Vec<GPlace>,
}

impl From<GPlace> for RawPlace {
    fn from(p: GPlace) -> Self {
        RawPlace {
            formatted_address: p.formatted_address,
            google_maps_uri: p.google_maps_uri,
            primary_type: p.primary_type,
            display_name: p.display_name.text,
            longitude: p.location.longitude,
            latitude: p.location.latitude,
            current_opening_hours: p.current_opening_hours.to_string(),
        }
    }
}

pub struct GooglePlacesFetcher {
    client: reqwest::Client,
    api_key: String,
}

impl GooglePlacesFetcher {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
            api_key,
        }
    }
}

const GOOGLE_FIELD_MASK: &str = "places.displayName,places.formattedAddress,places.googleMapsUri,places.location,places.primaryType,places.currentOpeningHours";

#[async_trait]
impl ExternalFetcher for GooglePlacesFetcher {
    async fn fetch_circle(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
        included_types: &[String],
    ) -> Result<Vec<RawPlace>, CoreError> {
        let body = GSearchNearbyRequest {
            included_types: included_types.to_vec(),
            rank_preference: "POPULARITY".to_string(),
            location_restriction: GLocationRestriction {
                circle: GCircle {
                    center: GLocation {
                        latitude: center_lat,
                        longitude: center_lon,
                    },
                    radius: radius_m,
                },
            },
        };

        let response = self
            .client
            .post("https://places.googleapis.com/v1/places:searchNearby")
            .header("Content-Type", "application/json")
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", GOOGLE_FIELD_MASK)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() || text.trim() == "{}" {
            return Ok(Vec::new());
        }

        let parsed: GSearchNearbyResponse = serde_json::from_str(&text).unwrap_or_default();
        Ok(parsed.places.into_iter().map(RawPlace::from).collect())
    }

    fn page_limit(&self) -> usize {
        GOOGLE_PAGE_LIMIT
    }
}

// --- Overpass (OSM) -------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct OverpassElement {
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

impl From<OverpassElement> for RawPlace {
    fn from(e: OverpassElement) -> Self {
        let formatted_address = synthesize_address(&e.tags);
        let display_name = e
            .tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let primary_type = e
            .tags
            .get("amenity")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());

        RawPlace {
            formatted_address,
            google_maps_uri: String::new(),
            primary_type,
            display_name,
            longitude: e.lon,
            latitude: e.lat,
            current_opening_hours: e
                .tags
                .get("opening_hours")
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Synthesizes a formatted address from `addr:*` tags.
fn synthesize_address(tags: &std::collections::HashMap<String, String>) -> String {
    let mut parts = Vec::new();
    for key in ["addr:housenumber", "addr:street", "addr:city", "addr:country"] {
        if let Some(v) = tags.get(key) {
            parts.push(v.as_str());
        }
    }
    if parts.is_empty() {
        "Unknown".to_string()
    } else {
        parts.join(" ")
    }
}

pub struct OverpassFetcher {
    client: reqwest::Client,
}

impl OverpassFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
        }
    }
}

#[async_trait]
impl ExternalFetcher for OverpassFetcher {
    async fn fetch_circle(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
        included_types: &[String],
    ) -> Result<Vec<RawPlace>, CoreError> {
        let types_joined = included_types.join("|");
        let ql = format!(
            "[out:json];node[amenity~\"{types_joined}\"](around:{radius_m},{center_lat},{center_lon});out body;"
        );
        let url = format!(
            "https://overpass-api.de/api/interpreter?data={}",
            urlencoding::encode(&ql)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: OverpassResponse = serde_json::from_str(&text).unwrap_or_default();
        Ok(parsed.elements.into_iter().map(RawPlace::from).collect())
    }

    fn page_limit(&self) -> usize {
        OVERPASS_RESULT_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_token_is_last_word_of_address() {
        let p = RawPlace {
            formatted_address: "1 Rue de Rivoli, 75001 Paris France".to_string(),
            ..Default::default()
        };
        assert_eq!(p.country_token(), Some("France"));
    }

    #[test]
    fn synthesizes_address_from_addr_tags() {
        let mut tags = std::collections::HashMap::new();
        tags.insert("addr:housenumber".to_string(), "12".to_string());
        tags.insert("addr:street".to_string(), "Main St".to_string());
        tags.insert("addr:city".to_string(), "Springfield".to_string());
        tags.insert("addr:country".to_string(), "USA".to_string());
        let addr = synthesize_address(&tags);
        assert_eq!(addr, "12 Main St Springfield USA");
    }

    #[test]
    fn synthesizes_unknown_address_without_tags() {
        let tags = std::collections::HashMap::new();
        assert_eq!(synthesize_address(&tags), "Unknown");
    }
}
