//! Retry and backoff policy
//!
//! Every failure is retryable: the affected day simply stays pending and is
//! visited again on the next pass. What differs between failures is how long
//! the crawler stays quiet before its next request to the same server.
//!
//! | Failure | Wait |
//! |---------|------|
//! | HTTP status with a configured rule (429, 502, 503, 504 by default) | rule, or Retry-After if longer |
//! | Any other HTTP status | none |
//! | Transport failure (DNS, reset, timeout) | none |
//! | Parse failure | none |

use crate::config::BackoffConfig;
use crate::crawler::FetchError;
use std::collections::HashMap;
use std::time::Duration;

/// Longest server-requested wait the crawler will honor
const MAX_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// What to do after a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Pause before the next request to the same server
    pub wait: Option<Duration>,

    /// Whether the failed unit is attempted again in a later pass
    pub retryable: bool,
}

/// Maps failures to waits
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    waits: HashMap<u16, Duration>,
    honor_retry_after: bool,
}

impl BackoffPolicy {
    /// Creates a policy from explicit status waits, honoring Retry-After
    pub fn new(waits: impl IntoIterator<Item = (u16, Duration)>) -> Self {
        Self {
            waits: waits.into_iter().collect(),
            honor_retry_after: true,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            waits: config
                .rules
                .iter()
                .map(|rule| (rule.status, Duration::from_secs(rule.wait_secs)))
                .collect(),
            honor_retry_after: config.honor_retry_after,
        }
    }

    /// Toggles use of the server's Retry-After header
    pub fn with_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }

    /// Returns the configured wait for a status, if any
    pub fn wait_for_status(&self, status: u16) -> Option<Duration> {
        self.waits.get(&status).copied()
    }

    /// Classifies a failure
    pub fn decide(&self, error: &FetchError) -> RetryDecision {
        let wait = match error {
            FetchError::Http {
                status,
                retry_after,
            } => {
                // Retry-After only lengthens a rule; it never creates one
                self.wait_for_status(*status).map(|rule| {
                    retry_after
                        .filter(|_| self.honor_retry_after)
                        .map(|requested| rule.max(requested.min(MAX_RETRY_AFTER)))
                        .unwrap_or(rule)
                })
            }
            FetchError::Transport(_) | FetchError::Parse(_) => None,
        };

        RetryDecision {
            wait: wait.filter(|d| !d.is_zero()),
            retryable: true,
        }
    }

    /// Sleeps for the decided wait, if any
    pub async fn apply(&self, decision: &RetryDecision) {
        if let Some(wait) = decision.wait {
            tracing::info!("Backing off for {:?} before the next request", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
