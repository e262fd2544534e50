use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{CollectorError, Result};
use crate::types::RelayEndpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_relays")]
    pub relays: Vec<RelayConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub name: String,

    pub url: String,

    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl RelayConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn endpoint(&self) -> RelayEndpoint {
        RelayEndpoint::new(self.name.clone(), self.url.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    /// In-flight relay requests allowed within one block's collection.
    #[serde(default = "default_relays_per_block")]
    pub relays_per_block: usize,

    /// Block pipelines allowed in flight across the whole range.
    #[serde(default = "default_blocks")]
    pub blocks: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            relays_per_block: default_relays_per_block(),
            blocks: default_blocks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_relays() -> Vec<RelayConfig> {
    vec![
        RelayConfig::new(
            "flashbots",
            "https://0xac6e77dfe25ecd6110b8e780608cce0dab71fdd5ebea22a16c0205200f2f8e2e3ad3b71d3499c54ad14d6c21b41a37ae@boost-relay.flashbots.net",
        ),
        RelayConfig::new(
            "bloxroute max profit",
            "https://0x8b5d2e73e2a3a55c6c87b8b6eb92e0149a125c852751db1422fa951e42a09b82c142c3ea98d0d9930b056a3bc9896b8f@bloxroute.max-profit.blxrbdn.com",
        ),
        RelayConfig::new(
            "bloxroute regulated",
            "https://0xb0b07cd0abef743db4260b0ed50619cf6ad4d82064cb4fbec9d3ec530f7c5e6793d9f286c4e082c0244ffb9f2658fe88@bloxroute.regulated.blxrbdn.com",
        ),
        RelayConfig::new(
            "ultrasound",
            "https://0xa1559ace749633b997cb3fdacffb890aeebdb0f5a3b6aaa7eeeaf1a38af0a8fe88b9e4b1f61f236d2e64d95733327a62@relay.ultrasound.money",
        ),
        RelayConfig::new(
            "agnostic",
            "https://0xa7ab7a996c8584251c8f925da3170bdfd6ebc75d50f5ddc4050a6fdc77f2a3b5fce2cc750d0865e05d7228af97d69561@agnostic-relay.net",
        ),
        RelayConfig::new(
            "aestus",
            "https://0xa15b52576bcbf1072f4a011c0f99f9fb6c66f3e1ff321f11f461d15e31b1cb359caa092c71bbded0bae5b5ea401aab7e@aestus.live",
        ),
    ]
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_relays_per_block() -> usize {
    10
}

fn default_blocks() -> usize {
    100
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("outputs")
}

impl Config {
    pub fn from_file(path: PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| CollectorError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::from_json(&config_str)
    }

    pub fn from_json(config_str: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(config_str)
            .map_err(|e| CollectorError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relays.is_empty() {
            return Err(CollectorError::ConfigError(
                "At least one relay must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for relay in &self.relays {
            if !names.insert(relay.name.as_str()) {
                return Err(CollectorError::ConfigError(format!(
                    "Duplicate relay name: {}",
                    relay.name
                )));
            }
            url::Url::parse(&relay.url)?;
        }

        if self.retry.max_attempts == 0 {
            return Err(CollectorError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.concurrency.relays_per_block == 0 || self.concurrency.blocks == 0 {
            return Err(CollectorError::ConfigError(
                "Concurrency limits must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
