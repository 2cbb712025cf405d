//! Apple in-app-purchase receipt verification, falling back to the
//! sandbox endpoint on `status = 21007`.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";
const SANDBOX_REDIRECT_STATUS: i64 = 21007;

#[derive(Serialize)]
struct VerifyReceiptRequest<'a> {
    #[serde(rename = "receipt-data")]
    receipt_data: &'a str,
    password: &'a str,
    #[serde(rename = "exclude-old-transactions")]
    exclude_old_transactions: bool,
}

#[derive(Debug, Deserialize, Default)]
struct LatestReceiptInfo {
    #[serde(default, rename = "product_id")]
    product_id: String,
    #[serde(default, rename = "transaction_id")]
    transaction_id: String,
}

#[derive(Debug, Deserialize, Default)]
struct VerifyReceiptResponse {
    status: i64,
    #[serde(default)]
    latest_receipt_info: Vec<LatestReceiptInfo>,
}

pub struct VerifiedPurchase {
    pub product_id: String,
    pub transaction_id: String,
}

pub struct ReceiptVerifier {
    client: reqwest::Client,
    shared_secret: String,
}

impl ReceiptVerifier {
    pub fn new(shared_secret: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
            shared_secret,
        }
    }

    pub async fn verify(&self, receipt_data: &str) -> Result<VerifiedPurchase, CoreError> {
        let mut response = self.post(PRODUCTION_URL, receipt_data).await?;
        if response.status == SANDBOX_REDIRECT_STATUS {
            tracing::debug!("receipt redirected to sandbox, retrying");
            response = self.post(SANDBOX_URL, receipt_data).await?;
        }

        if response.status != 0 {
            return Err(CoreError::Auth { status: response.status });
        }

        let info = response
            .latest_receipt_info
            .into_iter()
            .last()
            .ok_or(CoreError::Auth { status: response.status })?;

        Ok(VerifiedPurchase {
            product_id: info.product_id,
            transaction_id: info.transaction_id,
        })
    }

    async fn post(&self, url: &str, receipt_data: &str) -> Result<VerifyReceiptResponse, CoreError> {
        let body = VerifyReceiptRequest {
            receipt_data,
            password: &self.shared_secret,
            exclude_old_transactions: true,
        };

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response.json().await?)
    }
}
