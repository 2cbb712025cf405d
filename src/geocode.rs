//! Reverse-geocoding pass-through to `geocode.maps.co`. The upstream JSON
//! body is returned verbatim rather than re-modeled.

use crate::error::CoreError;
use std::time::Duration;

pub struct GeocodeClient {
    client: reqwest::Client,
    api_key: String,
}

impl GeocodeClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
            api_key,
        }
    }

    pub async fn reverse(&self, latitude: f64, longitude: f64) -> Result<serde_json::Value, CoreError> {
        let url = format!(
            "https://geocode.maps.co/reverse?lat={latitude}&lon={longitude}&api_key={}",
            self.api_key
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| CoreError::Upstream { status: status.as_u16(), body: e.to_string() })
    }
}
