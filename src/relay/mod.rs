use crate::errors::Result;
use crate::types::RelayEndpoint;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait RelayService: Send + Sync {
    /// Makes a single attempt at fetching the raw bid traces for a block
    async fn get_builder_bids(&self, block_number: u64) -> Result<Vec<Value>>;
    /// Returns the relay this service talks to
    fn endpoint(&self) -> &RelayEndpoint;

    fn name(&self) -> &str {
        &self.endpoint().name
    }

    fn get_url(&self, block_number: u64) -> String {
        self.endpoint().bid_traces_url(block_number)
    }
}

pub mod client;
pub mod retry;
