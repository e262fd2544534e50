use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::error::ArrowError;
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::json::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::errors::{CollectorError, Result};
use crate::types::{BidRecord, BlockBidSet};

/// Destination for a block's aggregated bids.
#[async_trait]
pub trait BidSink: Send + Sync {
    async fn persist(&self, bids: &BlockBidSet) -> Result<()>;
}

/// Writes one Parquet file per block, `{output_dir}/{block_number}.parquet`.
///
/// The schema is inferred from the block's records, so fields that only some
/// relays send become nullable columns.
#[derive(Debug, Clone)]
pub struct FileWriter {
    output_dir: PathBuf,
}

impl FileWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, block_number: u64) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", block_number))
    }

    /// Creates the output directory if it doesn't exist
    pub fn initialize(&self) -> Result<()> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir)?;
            info!(path = %self.output_dir.display(), "Created output directory");
        }
        Ok(())
    }

    #[instrument(skip(self, bids), fields(block = bids.block_number, num_bids = bids.len()))]
    pub fn write_block(&self, bids: &BlockBidSet) -> Result<PathBuf> {
        if bids.is_empty() {
            return Err(CollectorError::InvalidResponseError(format!(
                "Refusing to write empty bid set for block {}",
                bids.block_number
            )));
        }

        self.initialize()?;

        let batch = records_to_batch(&bids.bids)?;
        let path = self.path_for(bids.block_number);

        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;

        info!(count = bids.len(), path = %path.display(), "Saved relay bids");
        Ok(path)
    }
}

#[async_trait]
impl BidSink for FileWriter {
    async fn persist(&self, bids: &BlockBidSet) -> Result<()> {
        self.write_block(bids).map(|_| ())
    }
}

/// Converts the opaque bid records into a single Arrow batch.
///
/// A field that is an object in one record and a scalar or array in another
/// has no common Arrow type, so such columns are stored as JSON text.
pub fn records_to_batch(records: &[BidRecord]) -> Result<RecordBatch> {
    let rows = normalize_rows(records);
    let schema = infer_schema(&rows)?;
    debug!(columns = schema.fields().len(), rows = rows.len(), "Inferred bid schema");

    let mut decoder = ReaderBuilder::new(Arc::new(schema.clone()))
        .with_batch_size(rows.len().max(1))
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(rows.as_slice())?;

    match decoder.flush()? {
        Some(batch) => Ok(batch),
        None => Ok(RecordBatch::new_empty(Arc::new(schema))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonShape {
    Scalar,
    Object,
    Array,
}

impl JsonShape {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(_) => Some(JsonShape::Object),
            Value::Array(_) => Some(JsonShape::Array),
            _ => Some(JsonShape::Scalar),
        }
    }
}

/// Names of fields whose non-null values don't share one JSON shape.
fn conflicting_fields(records: &[BidRecord]) -> BTreeSet<String> {
    let mut shapes: HashMap<&str, JsonShape> = HashMap::new();
    let mut conflicts = BTreeSet::new();

    for record in records {
        for (name, value) in record.fields() {
            let Some(shape) = JsonShape::of(value) else {
                continue;
            };
            match shapes.get(name.as_str()) {
                Some(seen) if *seen != shape => {
                    conflicts.insert(name.clone());
                }
                Some(_) => {}
                None => {
                    shapes.insert(name, shape);
                }
            }
        }
    }

    conflicts
}

fn normalize_rows(records: &[BidRecord]) -> Vec<Map<String, Value>> {
    let conflicts = conflicting_fields(records);
    if !conflicts.is_empty() {
        warn!(columns = ?conflicts, "Storing columns with mixed JSON shapes as text");
    }

    records
        .iter()
        .map(|record| {
            let mut fields = record.fields().clone();
            for name in &conflicts {
                if let Some(value) = fields.get_mut(name) {
                    if !value.is_null() && !value.is_string() {
                        *value = Value::String(value.to_string());
                    }
                }
            }
            fields
        })
        .collect()
}

fn infer_schema(rows: &[Map<String, Value>]) -> Result<Schema> {
    let values = rows
        .iter()
        .map(|row| Ok::<_, ArrowError>(Value::Object(row.clone())));
    Ok(infer_json_schema_from_iterator(values)?)
}
