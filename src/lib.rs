//! Gerry-Harvest: a resumable crawler for Gerrit code-review servers
//!
//! This crate harvests every closed change (and its full detail payload) from
//! a Gerrit-style review server over a historical date range. Each change is
//! persisted as its own JSON file inside a per-day directory, and those
//! directories double as the resumption checkpoint for interrupted crawls.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod timeframe;

use thiserror::Error;

/// Main error type for Gerry-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl of {target} stopped after {passes} passes with {pending} days still pending")]
    PassLimit {
        target: String,
        passes: u32,
        pending: usize,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown target '{name}' (known targets: {known})")]
    UnknownTarget { name: String, known: String },
}

/// Result type alias for Gerry-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, ResumeMode, Target};
pub use crawler::{run_harvest, Coordinator, CrawlReport};
pub use state::UnitState;
pub use storage::{WorkUnit, WorkUnitStore};
pub use timeframe::{create_time_frames, format_timestamp, TimeFrame};
