//! Constant-delay retry around a single relay fetch.
//!
//! The retry loop is driven by [`RetryState`] so the transitions can be checked
//! without a network or a clock, and the wait between attempts goes through a
//! [`Sleeper`] that tests replace with one that returns immediately.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::RetryConfig;
use crate::errors::CollectorError;
use crate::types::{BidRecord, FetchOutcome};
use super::RelayService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: config.delay,
        }
    }
}

/// Where a relay/block fetch currently is. `attempt` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    WaitingToRetry { attempt: u32 },
    Succeeded,
    Exhausted,
}

impl RetryState {
    pub fn start(policy: &RetryPolicy) -> Self {
        if policy.max_attempts == 0 {
            RetryState::Exhausted
        } else {
            RetryState::Attempting { attempt: 1 }
        }
    }

    pub fn on_success(self) -> Self {
        match self {
            RetryState::Attempting { .. } => RetryState::Succeeded,
            other => other,
        }
    }

    pub fn on_failure(self, policy: &RetryPolicy) -> Self {
        match self {
            RetryState::Attempting { attempt } if attempt < policy.max_attempts => {
                RetryState::WaitingToRetry { attempt }
            }
            RetryState::Attempting { .. } => RetryState::Exhausted,
            other => other,
        }
    }

    pub fn on_wait_elapsed(self) -> Self {
        match self {
            RetryState::WaitingToRetry { attempt } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::Exhausted)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fetches one relay for one block, retrying failed attempts per the policy.
/// Never returns an error: exhausted retries become [`FetchOutcome::Failure`].
pub struct RelayFetcher {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl RelayFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Box::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, relay: &dyn RelayService, block_number: u64) -> FetchOutcome {
        let mut state = RetryState::start(&self.policy);
        let mut fetched = Vec::new();
        let mut last_error: Option<CollectorError> = None;

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let result = relay
                        .get_builder_bids(block_number)
                        .await
                        .and_then(|raw| BidRecord::tag_all(raw, relay.name()));

                    match result {
                        Ok(bids) => {
                            fetched = bids;
                            state.on_success()
                        }
                        Err(e) => {
                            error!(
                                relay = relay.name(),
                                block = block_number,
                                attempt,
                                url = %relay.get_url(block_number),
                                error = %e,
                                "Error fetching bids from relay"
                            );
                            last_error = Some(e);
                            state.on_failure(&self.policy)
                        }
                    }
                }
                RetryState::WaitingToRetry { attempt } => {
                    debug!(
                        relay = relay.name(),
                        block = block_number,
                        attempt,
                        delay = ?self.policy.retry_delay,
                        "Waiting before retrying relay"
                    );
                    self.sleeper.sleep(self.policy.retry_delay).await;
                    state.on_wait_elapsed()
                }
                RetryState::Succeeded => return FetchOutcome::from_bids(fetched),
                RetryState::Exhausted => {
                    let last_error = last_error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no attempts made".to_string());
                    return FetchOutcome::Failure(CollectorError::RetriesExhausted {
                        relay: relay.name().to_string(),
                        attempts: self.policy.max_attempts,
                        last_error,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_bid, MockRelay, MockResponse, RecordingSleeper};
    use serde_json::json;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_state_transitions() {
        let policy = policy(2);
        let state = RetryState::start(&policy);
        assert_eq!(state, RetryState::Attempting { attempt: 1 });

        let state = state.on_failure(&policy);
        assert_eq!(state, RetryState::WaitingToRetry { attempt: 1 });

        let state = state.on_wait_elapsed();
        assert_eq!(state, RetryState::Attempting { attempt: 2 });

        let state = state.on_failure(&policy);
        assert_eq!(state, RetryState::Exhausted);
        assert!(state.is_terminal());

        let state = RetryState::Attempting { attempt: 2 }.on_success();
        assert_eq!(state, RetryState::Succeeded);
    }

    #[test]
    fn test_zero_attempts_is_exhausted() {
        assert_eq!(RetryState::start(&policy(0)), RetryState::Exhausted);
    }

    #[tokio::test]
    async fn test_retries_then_exhausts() {
        let relay = MockRelay::new("aestus").with_default(MockResponse::Timeout);
        let sleeper = RecordingSleeper::new();
        let fetcher = RelayFetcher::with_sleeper(policy(3), Box::new(sleeper.clone()));

        let outcome = fetcher.fetch(&relay, 100).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failure(CollectorError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(relay.calls(), 3);
        // Delay only between attempts, not after the last one.
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let relay = MockRelay::new("ultrasound")
            .respond(100, MockResponse::Status(502))
            .respond(100, MockResponse::Bids(vec![create_test_bid(100, 7)]));
        let sleeper = RecordingSleeper::new();
        let fetcher = RelayFetcher::with_sleeper(policy(3), Box::new(sleeper.clone()));

        let bids = fetcher.fetch(&relay, 100).await.into_bids();

        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].relay_name(), Some("ultrasound"));
        assert_eq!(relay.calls(), 2);
        assert_eq!(sleeper.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_array_is_empty_outcome() {
        let relay = MockRelay::new("agnostic");
        let fetcher = RelayFetcher::with_sleeper(policy(3), Box::new(RecordingSleeper::new()));

        assert!(matches!(fetcher.fetch(&relay, 100).await, FetchOutcome::Empty));
        assert_eq!(relay.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_retried() {
        let relay = MockRelay::new("flashbots")
            .respond(100, MockResponse::Bids(vec![json!("not an object")]))
            .respond(100, MockResponse::Bids(vec![create_test_bid(100, 1)]));
        let fetcher = RelayFetcher::with_sleeper(policy(3), Box::new(RecordingSleeper::new()));

        let bids = fetcher.fetch(&relay, 100).await.into_bids();

        assert_eq!(bids.len(), 1);
        assert_eq!(relay.calls(), 2);
    }
}
