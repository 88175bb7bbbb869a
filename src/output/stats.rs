//! Statistics generation from harvested data
//!
//! This module provides functionality for summarizing the on-disk state of
//! a target's crawl without contacting the server.

use crate::config::ResumeMode;
use crate::state::UnitState;
use crate::storage::{StorageResult, WorkUnitStore};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Total number of day directories
    pub total_units: u64,

    /// Count of days by state
    pub units_by_state: HashMap<UnitState, u64>,

    /// Number of change files on disk
    pub change_files: u64,

    /// Earliest day directory
    pub first_day: Option<NaiveDate>,

    /// Latest day directory
    pub last_day: Option<NaiveDate>,

    /// Busiest day and its change count
    pub busiest_day: Option<(NaiveDate, u64)>,

    /// Latest day that needs no further crawling
    pub last_complete_day: Option<NaiveDate>,
}

impl HarvestStatistics {
    pub fn count(&self, state: UnitState) -> u64 {
        self.units_by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Loads statistics from a work unit store
///
/// # Arguments
///
/// * `store` - The store to inspect
/// * `mode` - The resume mode used to decide whether a day is complete
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to read the store
pub fn load_statistics(store: &WorkUnitStore, mode: ResumeMode) -> StorageResult<HarvestStatistics> {
    let units = store.units()?;

    let mut units_by_state = HashMap::new();
    let mut change_files = 0;
    let mut busiest_day: Option<(NaiveDate, u64)> = None;
    let mut last_complete_day = None;

    for unit in &units {
        let state = store.unit_state(unit, mode)?;
        *units_by_state.entry(state).or_insert(0) += 1;
        if state.is_complete() {
            last_complete_day = Some(unit.day);
        }

        let count = store.change_count(unit)? as u64;
        change_files += count;
        if count > 0 && busiest_day.map_or(true, |(_, best)| count > best) {
            busiest_day = Some((unit.day, count));
        }
    }

    Ok(HarvestStatistics {
        total_units: units.len() as u64,
        units_by_state,
        change_files,
        first_day: units.first().map(|u| u.day),
        last_day: units.last().map(|u| u.day),
        busiest_day,
        last_complete_day,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Days: {}", stats.total_units);
    if let (Some(first), Some(last)) = (stats.first_day, stats.last_day) {
        println!("  Range: {} .. {}", first, last);
    }
    println!("  Change files: {}", stats.change_files);
    if let Some((day, count)) = stats.busiest_day {
        println!("  Busiest day: {} ({} changes)", day, count);
    }
    if let Some(day) = stats.last_complete_day {
        println!("  Latest complete day: {}", day);
    }
    println!();

    println!("Days by State:");
    for state in [UnitState::Complete, UnitState::Pending] {
        let count = stats.count(state);
        let percentage = if stats.total_units > 0 {
            (count as f64 / stats.total_units as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
}
