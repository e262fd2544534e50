pub mod collector;
pub mod concurrency;
pub mod config;
pub mod errors;
pub mod file_writer;
pub mod relay;
pub mod runner;
pub mod test_helpers;
pub mod types;
