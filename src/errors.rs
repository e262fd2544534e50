use thiserror::Error;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Relay returned status: {0}")]
    RelayStatusError(reqwest::StatusCode),

    #[error("Invalid response from relay: {0}")]
    InvalidResponseError(String),

    #[error("Operation timed out after {0:?}")]
    TimeoutError(Duration),

    #[error("Relay {relay} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        relay: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
