//! Output module for reporting on harvested data
//!
//! This module handles:
//! - Summarizing the on-disk state of a crawl
//! - Printing statistics for the command line

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
