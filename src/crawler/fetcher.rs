//! HTTP fetcher for the Gerrit REST API
//!
//! This module handles all requests sent to a review server:
//! - Building the HTTP client with user agent and timeouts
//! - Paginated listing of changes closed within a time frame
//! - Fetching the full detail payload of one change
//! - Stripping the XSSI guard prefix Gerrit puts in front of every body
//! - Classifying failures for the backoff policy

use crate::config::{HttpConfig, Target};
use crate::timeframe::{format_timestamp, TimeFrame};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Prefix Gerrit prepends to JSON responses
pub const MAGIC_PREFIX: &str = ")]}'";

/// Default upper bound on listing pages for one frame
pub const MAX_PAGES: usize = 10_000;

/// Failure of a single request against a review server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP status {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// The request never completed (DNS, connection reset, timeout)
    #[error("transport failure: {0}")]
    Transport(String),

    /// A 2xx body did not have the expected shape
    #[error("unparseable response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Stable label used in logs and crawl statistics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
        }
    }

    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport("request timed out".to_string())
        } else if e.is_connect() {
            Self::Transport(format!("connection failed: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeSummary {
    #[serde(rename = "_number")]
    pub number: u64,

    #[serde(default)]
    pub change_id: Option<String>,

    /// Only present, and only on the last entry, when another page follows
    #[serde(rename = "_more_changes", default)]
    pub more_changes: bool,
}

/// Full detail payload of one change, kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDetail {
    pub number: u64,
    pub payload: serde_json::Value,
}

impl ChangeDetail {
    pub fn change_id(&self) -> Option<&str> {
        self.payload.get("change_id").and_then(|v| v.as_str())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Removes the magic prefix and the line break after it
pub fn strip_magic_prefix(body: &str) -> Result<&str, FetchError> {
    match body.strip_prefix(MAGIC_PREFIX) {
        Some(rest) => Ok(rest.trim_start_matches(['\r', '\n'])),
        None => Err(FetchError::Parse(format!(
            "response does not start with {MAGIC_PREFIX:?}"
        ))),
    }
}

/// Builds the search expression for changes closed within a frame
pub fn listing_query(frame: &TimeFrame) -> String {
    format!(
        "after:{{{}}} AND before:{{{}}} AND is:closed",
        format_timestamp(&frame.start),
        format_timestamp(&frame.end)
    )
}

/// Stateless client for one review server
#[derive(Debug, Clone)]
pub struct GerritClient {
    client: Client,
    target: Target,
    max_pages: usize,
}

impl GerritClient {
    pub fn new(target: Target, config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(target, build_http_client(config)?))
    }

    pub fn with_client(target: Target, client: Client) -> Self {
        Self {
            client,
            target,
            max_pages: MAX_PAGES,
        }
    }

    /// Overrides the number of listing pages fetched before giving up on a frame
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Fetches one listing page starting at `offset`
    pub async fn list_changes(
        &self,
        frame: &TimeFrame,
        offset: usize,
    ) -> Result<Vec<ChangeSummary>, FetchError> {
        let url = self.target.endpoint("changes/");
        let query = [
            ("q", listing_query(frame)),
            ("S", offset.to_string()),
        ];
        self.get_json(&url, &query).await
    }

    /// Fetches every change closed within `frame`, following pagination
    ///
    /// A further page is requested while the last entry of the latest page
    /// carries `_more_changes`; the next offset is the number of entries
    /// received so far. Any failure aborts the listing for the frame.
    pub async fn changes_in_frame(
        &self,
        frame: &TimeFrame,
    ) -> Result<Vec<ChangeSummary>, FetchError> {
        let mut changes = Vec::new();
        let mut offset = 0;

        for page_number in 1..=self.max_pages {
            let page = self.list_changes(frame, offset).await?;
            let more = page.last().map(|c| c.more_changes).unwrap_or(false);

            tracing::debug!(
                "Listing page {} for {} returned {} changes (more: {})",
                page_number,
                frame,
                page.len(),
                more
            );

            offset += page.len();
            changes.extend(page);

            if !more {
                return Ok(changes);
            }
        }

        Err(FetchError::Parse(format!(
            "listing for {frame} still reported more changes after {} pages",
            self.max_pages
        )))
    }

    /// Fetches the full detail payload of one change
    pub async fn change_detail(&self, number: u64) -> Result<ChangeDetail, FetchError> {
        let url = self.target.endpoint(&format!("changes/{number}/detail/"));
        let query: Vec<(&str, String)> = self
            .target
            .capabilities
            .detail_options()
            .into_iter()
            .map(|option| ("o", option.to_string()))
            .collect();

        let payload = self.get_json(&url, &query).await?;
        Ok(ChangeDetail { number, payload })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let body = response.text().await?;
        let json = strip_magic_prefix(&body)?;
        serde_json::from_str(json).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Reads a `Retry-After` header given in seconds
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
