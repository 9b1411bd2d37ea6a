use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::FetchError;

const USER_AGENT: &str = concat!("pricenick/", env!("CARGO_PKG_VERSION"));

/// Thin HTTP client shared by the network-backed integrations.
pub struct PricingClient {
    http: Client,
}

impl PricingClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// GET a JSON document. Non-success statuses become [`FetchError::Status`].
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                code: resp.status().as_u16(),
            });
        }
        resp.json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    /// Whether `url` answers with a success status.
    pub async fn probe(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url, error = %e, "probe failed");
                false
            }
        }
    }
}
