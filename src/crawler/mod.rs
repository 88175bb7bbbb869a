//! Crawler module for harvesting changes from a review server
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching of change listings and change details
//! - Offset-based pagination of listings
//! - Failure classification and backoff
//! - Pass-based crawl coordination with on-disk resumption

mod backoff;
mod coordinator;
mod fetcher;

pub use backoff::{BackoffPolicy, RetryDecision};
pub use coordinator::{run_harvest, Coordinator, CrawlReport};
pub use fetcher::{
    build_http_client, listing_query, strip_magic_prefix, ChangeDetail, ChangeSummary,
    FetchError, GerritClient, MAGIC_PREFIX, MAX_PAGES,
};
