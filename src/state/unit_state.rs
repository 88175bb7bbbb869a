/// Work unit state definitions for tracking crawl progress
///
/// The state of a unit is never stored on its own; it is derived from the
/// contents of the unit's directory every time it is needed.
use std::fmt;

/// Represents the current state of one day of the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// No harvested output yet; the day is visited on the next pass
    Pending,

    /// The day has produced output and is skipped by later passes
    Complete,
}

impl UnitState {
    /// Returns true if this unit still needs to be crawled
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if no further processing is needed
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
