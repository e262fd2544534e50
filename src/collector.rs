use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    concurrency::ConcurrencyLimiter,
    config::Config,
    errors::Result,
    file_writer::BidSink,
    relay::{client::RelayClient, retry::{RelayFetcher, RetryPolicy}, RelayService},
    types::{BlockBidSet, FetchOutcome},
};

/// Collects every relay's bids for one block and hands the merged set to the sink.
pub struct BlockCollector {
    clients: Vec<Arc<dyn RelayService>>,
    fetcher: RelayFetcher,
    sink: Arc<dyn BidSink>,
    relay_limit: usize,
}

impl BlockCollector {
    pub fn new(
        clients: Vec<Arc<dyn RelayService>>,
        fetcher: RelayFetcher,
        sink: Arc<dyn BidSink>,
        relay_limit: usize,
    ) -> Self {
        Self {
            clients,
            fetcher,
            sink,
            relay_limit,
        }
    }

    /// Builds HTTP relay clients for every configured relay.
    pub fn from_config(config: &Config, sink: Arc<dyn BidSink>) -> Self {
        let clients = config
            .relays
            .iter()
            .map(|relay| Arc::new(RelayClient::new(relay)) as Arc<dyn RelayService>)
            .collect();

        Self::new(
            clients,
            RelayFetcher::new(RetryPolicy::from(&config.retry)),
            sink,
            config.concurrency.relays_per_block,
        )
    }

    pub fn relay_names(&self) -> Vec<&str> {
        self.clients.iter().map(|client| client.name()).collect()
    }

    /// Returns the persisted bid set, or `None` when no relay had bids for the block.
    /// Only a sink failure is returned as an error.
    #[instrument(skip(self), fields(relays = self.clients.len()))]
    pub async fn collect(&self, block_number: u64) -> Result<Option<BlockBidSet>> {
        let limiter = ConcurrencyLimiter::new(self.relay_limit);

        let outcomes = limiter
            .join_all(
                self.clients
                    .iter()
                    .map(|client| self.fetcher.fetch(client.as_ref(), block_number)),
            )
            .await;

        let mut bids = Vec::new();
        for (client, outcome) in self.clients.iter().zip(outcomes) {
            if let FetchOutcome::Failure(e) = &outcome {
                warn!(relay = client.name(), block = block_number, error = %e, "Relay contributed no bids");
            }
            bids.extend(outcome.into_bids());
        }

        debug!(block = block_number, count = bids.len(), "Got relay bids for block");

        if bids.is_empty() {
            info!(block = block_number, "No relay bids for block");
            return Ok(None);
        }

        let bid_set = BlockBidSet::new(block_number, bids);
        self.sink.persist(&bid_set).await?;
        Ok(Some(bid_set))
    }
}
