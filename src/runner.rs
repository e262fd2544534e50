use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::{collector::BlockCollector, concurrency::ConcurrencyLimiter, errors::CollectorError};

/// Summary of one range run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub blocks_requested: usize,
    pub blocks_written: usize,
    pub records_written: usize,
    /// Set when the run stopped early. Blocks written before that stay on disk.
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} blocks had bids, {} records written",
            self.blocks_written, self.blocks_requested, self.records_written
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, ", aborted: {}", reason)?;
        }
        Ok(())
    }
}

/// Drives block collection over `[from_block, to_block)`.
pub struct RangeRunner {
    collector: Arc<BlockCollector>,
    block_limit: usize,
}

impl RangeRunner {
    pub fn new(collector: Arc<BlockCollector>, block_limit: usize) -> Self {
        Self {
            collector,
            block_limit,
        }
    }

    /// Never fails: an error escaping a block pipeline stops the run and is
    /// recorded in the report.
    #[instrument(skip(self), fields(block_limit = self.block_limit))]
    pub async fn run(&self, from_block: u64, to_block: u64) -> RunReport {
        let blocks: Range<u64> = from_block..to_block;
        let blocks_requested = to_block.saturating_sub(from_block) as usize;

        if blocks_requested == 0 {
            warn!(from_block, to_block, "Empty block range, nothing to fetch");
            return RunReport::default();
        }

        info!(
            relays = ?self.collector.relay_names(),
            from_block,
            to_block,
            "Requesting relay bids metadata"
        );

        let blocks_written = AtomicUsize::new(0);
        let records_written = AtomicUsize::new(0);
        let limiter = ConcurrencyLimiter::new(self.block_limit);

        let result = limiter
            .try_join_all(blocks.map(|block_number| {
                let collector = &self.collector;
                let blocks_written = &blocks_written;
                let records_written = &records_written;
                async move {
                    if let Some(bid_set) = collector.collect(block_number).await? {
                        blocks_written.fetch_add(1, Ordering::Relaxed);
                        records_written.fetch_add(bid_set.len(), Ordering::Relaxed);
                    }
                    Ok::<_, CollectorError>(())
                }
            }))
            .await;

        let aborted = match result {
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Issue fetching relay bids");
                Some(e.to_string())
            }
        };

        let report = RunReport {
            blocks_requested,
            blocks_written: blocks_written.load(Ordering::Relaxed),
            records_written: records_written.load(Ordering::Relaxed),
            aborted,
        };
        info!(%report, "Finished collecting relay bids");
        report
    }
}
