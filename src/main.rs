use std::{path::PathBuf, sync::Arc};
use clap::{error::ErrorKind, Parser};
use tracing::{info, warn, instrument};
use tracing_subscriber::{fmt, EnvFilter};

use relay_bid_collector::{
    collector::BlockCollector,
    config::Config,
    errors::Result,
    file_writer::FileWriter,
    runner::RangeRunner,
};

/// Fetch builder bid traces from MEV-boost relays and store one Parquet file per block
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First block to fetch (inclusive)
    from_block: u64,

    /// Block to stop at (exclusive)
    to_block: u64,

    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    /// Directory for the per-block Parquet files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Exit with 1 when the run aborted, or 2 when no block in the range had bids
    #[arg(long)]
    require_output: bool,
}

// Filter logs with RUST_LOG, defaulting to info with the HTTP stack quietened to errors
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=error,hyper=error,hyper_util=error"));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .init();
}

// Bad arguments exit with 1 after the usage message, help and version exit with 0
fn usage_exit_code(e: &clap::Error) -> i32 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn parse_args() -> Args {
    Args::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(usage_exit_code(&e));
    })
}

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<()> {
    init_tracing();

    let args = parse_args();

    let mut config = match args.config {
        Some(path) => Config::from_file(path.into())?,
        None => Config::default(),
    };

    if let Some(output_dir) = args.output_dir {
        config.output.directory = output_dir;
    }

    config.validate()?;

    info!(
        relays = config.relays.len(),
        relays_per_block = config.concurrency.relays_per_block,
        blocks = config.concurrency.blocks,
        output = %config.output.directory.display(),
        "Starting relay bid collector"
    );

    let file_writer = Arc::new(FileWriter::new(config.output.directory.clone()));
    let collector = Arc::new(BlockCollector::from_config(&config, file_writer));
    let runner = RangeRunner::new(collector, config.concurrency.blocks);

    let report = runner.run(args.from_block, args.to_block).await;

    if args.require_output {
        if !report.is_complete() {
            std::process::exit(1);
        }
        if report.blocks_written == 0 {
            warn!(from_block = args.from_block, to_block = args.to_block, "No relay bids found in range");
            std::process::exit(2);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_code(args: &[&str]) -> i32 {
        let argv = std::iter::once("relay_bid_collector").chain(args.iter().copied());
        match Args::try_parse_from(argv) {
            Ok(_) => 0,
            Err(e) => usage_exit_code(&e),
        }
    }

    #[test]
    fn test_block_range_arguments() {
        let args = Args::try_parse_from(["relay_bid_collector", "100", "103", "--require-output"]).unwrap();
        assert_eq!(args.from_block, 100);
        assert_eq!(args.to_block, 103);
        assert!(args.require_output);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_wrong_argument_count_exits_with_one() {
        assert_eq!(exit_code(&[]), 1);
        assert_eq!(exit_code(&["100"]), 1);
        assert_eq!(exit_code(&["100", "101", "102"]), 1);

        let err = Args::try_parse_from(["relay_bid_collector", "100"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(err.to_string().contains("Usage"));
    }

    #[test]
    fn test_non_numeric_block_exits_with_one() {
        assert_eq!(exit_code(&["latest", "101"]), 1);
    }

    #[test]
    fn test_help_exits_with_zero() {
        assert_eq!(exit_code(&["--help"]), 0);
    }
}
