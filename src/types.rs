use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CollectorError, Result};

/// Field added to every relay payload to record where it came from.
pub const RELAY_NAME_FIELD: &str = "relay_name";

const BID_TRACES_PATH: &str = "/relay/v1/data/bidtraces/builder_blocks_received";

/// A relay known at startup. The base URL carries the relay public key as userinfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayEndpoint {
    pub name: String,
    pub base_url: String,
}

impl RelayEndpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    pub fn bid_traces_url(&self, block_number: u64) -> String {
        format!(
            "{}{}?block_number={}",
            self.base_url.trim_end_matches('/'),
            BID_TRACES_PATH,
            block_number
        )
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One bid trace as returned by a relay, tagged with the relay's name.
///
/// The payload is kept opaque: relays do not agree on an exact shape, so the
/// fields are stored as they arrived.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct BidRecord(Map<String, Value>);

impl BidRecord {
    /// Stamps a raw relay entry with `relay_name`. Anything other than a JSON
    /// object is rejected as a malformed payload.
    pub fn tagged(raw: Value, relay_name: &str) -> Result<Self> {
        match raw {
            Value::Object(mut fields) => {
                fields.insert(
                    RELAY_NAME_FIELD.to_string(),
                    Value::String(relay_name.to_string()),
                );
                Ok(Self(fields))
            }
            other => Err(CollectorError::InvalidResponseError(format!(
                "expected bid trace object, got {}",
                other
            ))),
        }
    }

    pub fn tag_all(raw: Vec<Value>, relay_name: &str) -> Result<Vec<Self>> {
        raw.into_iter()
            .map(|entry| Self::tagged(entry, relay_name))
            .collect()
    }

    pub fn relay_name(&self) -> Option<&str> {
        self.0.get(RELAY_NAME_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Display for BidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |name: &str| {
            self.0
                .get(name)
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| "-".to_string())
        };
        write!(
            f,
            "BidRecord {{ relay: {}, block_number: {}, builder_pubkey: {}, value: {} }}",
            field(RELAY_NAME_FIELD),
            field("block_number"),
            field("builder_pubkey"),
            field("value")
        )
    }
}

/// All bids collected for a single block, in relay configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBidSet {
    pub block_number: u64,
    pub bids: Vec<BidRecord>,
}

impl BlockBidSet {
    pub fn new(block_number: u64, bids: Vec<BidRecord>) -> Self {
        Self { block_number, bids }
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BidRecord> {
        self.bids.iter()
    }
}

/// Result of fetching one relay for one block, after retries.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Vec<BidRecord>),
    Empty,
    Failure(CollectorError),
}

impl FetchOutcome {
    pub fn from_bids(bids: Vec<BidRecord>) -> Self {
        if bids.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Success(bids)
        }
    }

    /// Records contributed to the block aggregate. Empty and failed fetches add nothing.
    pub fn into_bids(self) -> Vec<BidRecord> {
        match self {
            FetchOutcome::Success(bids) => bids,
            FetchOutcome::Empty | FetchOutcome::Failure(_) => Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failure(_))
    }
}
