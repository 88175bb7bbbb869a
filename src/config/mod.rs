//! Configuration module for Gerry-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and holds the table of review servers known out of the box.
//!
//! # Example
//!
//! ```no_run
//! use gerry_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("gerry.toml")).unwrap();
//! let target = config.target("gerrit").unwrap();
//! println!("Crawling {} from {}", target.base_url, target.start_date);
//! ```

mod parser;
mod targets;
mod types;
mod validation;

// Re-export types
pub use targets::{builtin_targets, Capabilities, Target};
pub use types::{
    BackoffConfig, BackoffRule, Config, CrawlConfig, HttpConfig, ResumeMode, TargetEntry,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
pub use validation::validate;
