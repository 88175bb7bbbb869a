//! Storage module for persisting harvested changes
//!
//! This module handles everything written to disk by a crawl:
//! - One directory per day (the work unit), created up front
//! - One JSON file per harvested change, written atomically
//! - Completion markers used for per-change resumption

mod work_units;

pub use work_units::{WorkUnitStore, COMPLETE_MARKER};

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn at(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One calendar day of the crawl and the directory holding its changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub day: NaiveDate,
    pub directory: PathBuf,
}

impl WorkUnit {
    /// Path of the file holding a change's detail payload
    pub fn change_path(&self, number: u64) -> PathBuf {
        self.directory.join(format!("{number}.json"))
    }

    /// Returns true if the change has already been harvested
    pub fn has_change(&self, number: u64) -> bool {
        self.change_path(number).exists()
    }
}
