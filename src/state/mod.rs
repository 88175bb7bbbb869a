//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UnitState`: Whether a day of the crawl is still pending or complete

mod unit_state;

pub use unit_state::UnitState;
