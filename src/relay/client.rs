use std::time::Duration;
use tokio::time::timeout;
use reqwest::Client;
use serde_json::Value;

use crate::errors::{CollectorError, Result};
use crate::types::RelayEndpoint;
use crate::config::RelayConfig;
use super::RelayService;

/// HTTP transport for one relay's data API.
pub struct RelayClient {
    endpoint: RelayEndpoint,
    request_timeout: Duration,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_endpoint(endpoint: RelayEndpoint, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            request_timeout,
        }
    }

    async fn request(&self, request_url: &str) -> Result<Vec<Value>> {
        // Every attempt gets its own connection pool.
        let client = Client::builder().build()?;

        let response = client
            .get(request_url)
            .header("accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollectorError::RelayStatusError(response.status()));
        }

        let body = response.bytes().await?;
        let payload = serde_json::from_slice::<Value>(&body).map_err(|e| {
            CollectorError::InvalidResponseError(format!("Failed to parse JSON response: {}", e))
        })?;

        match payload {
            Value::Array(bid_traces) => Ok(bid_traces),
            other => Err(CollectorError::InvalidResponseError(format!(
                "Expected a JSON array, got: {}",
                other
            ))),
        }
    }
}

#[async_trait::async_trait]
impl RelayService for RelayClient {
    fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    async fn get_builder_bids(&self, block_number: u64) -> Result<Vec<Value>> {
        let request_url = self.get_url(block_number);

        match timeout(self.request_timeout, self.request(&request_url)).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::TimeoutError(self.request_timeout)),
        }
    }
}
