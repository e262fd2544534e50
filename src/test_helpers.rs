use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::{CollectorError, Result};
use crate::file_writer::BidSink;
use crate::relay::retry::Sleeper;
use crate::relay::RelayService;
use crate::types::{BlockBidSet, RelayEndpoint};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Helper function to create a bid trace shaped like the relay data API returns it
pub fn create_test_bid(block_number: u64, value: u64) -> Value {
    json!({
        "slot": (block_number + 1000).to_string(),
        "parent_hash": format!("0xparent{}", block_number),
        "block_hash": format!("0xblock{}_{}", block_number, value),
        "builder_pubkey": format!("0xbuilder{}", value),
        "proposer_pubkey": "0xproposer",
        "proposer_fee_recipient": "0x0000000000000000000000000000000000000000",
        "gas_limit": "30000000",
        "gas_used": "10000000",
        "value": value.to_string(),
        "block_number": block_number.to_string(),
        "num_tx": "100",
        "timestamp": "1617979455",
        "timestamp_ms": "1617979455000"
    })
}

/// Counts how many instrumented operations are running at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

pub struct ProbeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            current: self.current.clone(),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub enum MockResponse {
    Bids(Vec<Value>),
    Status(u16),
    Timeout,
}

/// Scripted relay. Responses queued with [`MockRelay::respond`] are served in
/// order per block; once a block's queue is drained the default response is used.
#[derive(Clone)]
pub struct MockRelay {
    endpoint: RelayEndpoint,
    scripted: Arc<Mutex<HashMap<u64, VecDeque<MockResponse>>>>,
    default: MockResponse,
    latency: Option<Duration>,
    probe: Option<ConcurrencyProbe>,
    calls: Arc<AtomicUsize>,
}

impl MockRelay {
    pub fn new(name: &str) -> Self {
        Self {
            endpoint: RelayEndpoint::new(name, format!("https://0xpubkey@{}.relay.test", name.replace(' ', "-"))),
            scripted: Arc::new(Mutex::new(HashMap::new())),
            default: MockResponse::Bids(Vec::new()),
            latency: None,
            probe: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn respond(self, block_number: u64, response: MockResponse) -> Self {
        lock(&self.scripted)
            .entry(block_number)
            .or_default()
            .push_back(response);
        self
    }

    pub fn with_default(mut self, response: MockResponse) -> Self {
        self.default = response;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayService for MockRelay {
    fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    async fn get_builder_bids(&self, block_number: u64) -> Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = lock(&self.scripted)
            .get_mut(&block_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());

        match response {
            MockResponse::Bids(bids) => Ok(bids),
            MockResponse::Status(code) => Err(CollectorError::RelayStatusError(
                reqwest::StatusCode::from_u16(code)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            )),
            MockResponse::Timeout => Err(CollectorError::TimeoutError(Duration::from_secs(10))),
        }
    }
}

/// Sink that keeps persisted bid sets in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    written: Arc<Mutex<Vec<BlockBidSet>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails.
    pub fn failing() -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn written_blocks(&self) -> Vec<u64> {
        lock(&self.written).iter().map(|set| set.block_number).collect()
    }

    pub fn written(&self, block_number: u64) -> Option<BlockBidSet> {
        lock(&self.written)
            .iter()
            .find(|set| set.block_number == block_number)
            .cloned()
    }
}

#[async_trait]
impl BidSink for MemorySink {
    async fn persist(&self, bids: &BlockBidSet) -> Result<()> {
        if self.fail {
            return Err(CollectorError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("refusing to write block {}", bids.block_number),
            )));
        }
        lock(&self.written).push(bids.clone());
        Ok(())
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        tokio::task::yield_now().await;
    }
}
