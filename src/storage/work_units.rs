//! Per-day work unit directories
//!
//! Layout: `{root}/{target}/changes/{YYYY-MM-DD}/{change_number}.json`.
//! The directories are the only persisted crawl state.

use crate::config::ResumeMode;
use crate::state::UnitState;
use crate::storage::{StorageError, StorageResult, WorkUnit};
use crate::timeframe::TimeFrame;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Written once every change of a day has been harvested
pub const COMPLETE_MARKER: &str = ".complete";

/// Suffix of in-flight change files
const PARTIAL_SUFFIX: &str = ".part";

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Filesystem-backed set of work units for one target
#[derive(Debug, Clone)]
pub struct WorkUnitStore {
    changes_dir: PathBuf,
}

impl WorkUnitStore {
    /// Creates a store rooted at `{root}/{target}/changes`
    ///
    /// Nothing is created on disk until [`WorkUnitStore::create_units`].
    pub fn new(root: &Path, target: &str) -> Self {
        Self {
            changes_dir: root.join(target).join("changes"),
        }
    }

    pub fn changes_dir(&self) -> &Path {
        &self.changes_dir
    }

    /// Returns the unit for a day, whether or not it exists on disk
    pub fn unit(&self, day: NaiveDate) -> WorkUnit {
        WorkUnit {
            day,
            directory: self.changes_dir.join(day.format(DAY_FORMAT).to_string()),
        }
    }

    /// Materializes one directory per day touched by `frames`
    ///
    /// Existing directories and their contents are left untouched.
    pub fn create_units(&self, frames: &[TimeFrame]) -> StorageResult<Vec<WorkUnit>> {
        let days: BTreeSet<NaiveDate> = frames.iter().map(TimeFrame::start_day).collect();

        let mut units = Vec::with_capacity(days.len());
        for day in days {
            let unit = self.unit(day);
            fs::create_dir_all(&unit.directory).map_err(|e| StorageError::at(&unit.directory, e))?;
            units.push(unit);
        }

        Ok(units)
    }

    /// Lists every day directory under the store, sorted by day
    ///
    /// Entries whose name is not a `YYYY-MM-DD` date are ignored.
    pub fn units(&self) -> StorageResult<Vec<WorkUnit>> {
        let entries = match fs::read_dir(&self.changes_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::at(&self.changes_dir, e)),
        };

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::at(&self.changes_dir, e))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            match NaiveDate::parse_from_str(name, DAY_FORMAT) {
                Ok(day) => units.push(WorkUnit {
                    day,
                    directory: entry.path(),
                }),
                Err(_) => tracing::debug!("Ignoring non-day entry {}", entry.path().display()),
            }
        }

        units.sort_by_key(|unit| unit.day);
        Ok(units)
    }

    /// Derives the state of a unit from its directory contents
    pub fn unit_state(&self, unit: &WorkUnit, mode: ResumeMode) -> StorageResult<UnitState> {
        let complete = match mode {
            ResumeMode::Day => self
                .entries(unit)?
                .iter()
                .any(|name| !name.ends_with(PARTIAL_SUFFIX)),
            ResumeMode::Change => unit.directory.join(COMPLETE_MARKER).exists(),
        };

        Ok(if complete {
            UnitState::Complete
        } else {
            UnitState::Pending
        })
    }

    /// Returns the units that still need crawling, sorted by day
    pub fn pending_units(&self, mode: ResumeMode) -> StorageResult<Vec<WorkUnit>> {
        let mut pending = Vec::new();
        for unit in self.units()? {
            if self.unit_state(&unit, mode)?.is_pending() {
                pending.push(unit);
            }
        }
        Ok(pending)
    }

    /// Persists one change payload as `{number}.json`
    ///
    /// The payload is written to a temporary file in the same directory and
    /// renamed into place, so a reader never observes a truncated file.
    pub fn write_change(
        &self,
        unit: &WorkUnit,
        number: u64,
        payload: &serde_json::Value,
    ) -> StorageResult<PathBuf> {
        let path = unit.change_path(number);

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{number}."))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&unit.directory)
            .map_err(|e| StorageError::at(&unit.directory, e))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, payload)?;
            writer.flush().map_err(|e| StorageError::at(temp.path(), e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| StorageError::at(temp.path(), e))?;

        temp.persist(&path)
            .map_err(|e| StorageError::at(&path, e.error))?;

        Ok(path)
    }

    /// Records that every change of the unit has been harvested
    pub fn mark_complete(&self, unit: &WorkUnit) -> StorageResult<()> {
        let path = unit.directory.join(COMPLETE_MARKER);
        fs::write(&path, b"").map_err(|e| StorageError::at(&path, e))
    }

    /// Deletes in-flight files left behind by an interrupted run
    pub fn remove_partial_files(&self, unit: &WorkUnit) -> StorageResult<usize> {
        let mut removed = 0;
        for name in self.entries(unit)? {
            if name.ends_with(PARTIAL_SUFFIX) {
                let path = unit.directory.join(&name);
                fs::remove_file(&path).map_err(|e| StorageError::at(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Counts the change files stored for a unit
    pub fn change_count(&self, unit: &WorkUnit) -> StorageResult<usize> {
        Ok(self
            .entries(unit)?
            .iter()
            .filter(|name| !name.starts_with('.') && name.ends_with(".json"))
            .count())
    }

    fn entries(&self, unit: &WorkUnit) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&unit.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::at(&unit.directory, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::at(&unit.directory, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}
