//! Known review servers and target resolution

use crate::config::types::{calendar_date, Config, TargetEntry};
use crate::ConfigError;
use chrono::NaiveDate;
use url::Url;

/// Detail options understood by every supported server
const BASE_DETAIL_OPTIONS: [&str; 7] = [
    "DETAILED_LABELS",
    "MESSAGES",
    "DETAILED_ACCOUNTS",
    "REVIEWED",
    "ALL_FILES",
    "ALL_COMMITS",
    "ALL_REVISIONS",
];

/// Features that differ between server flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Server accepts `o=REVIEWER_UPDATES` on the detail endpoint
    pub reviewer_updates: bool,
}

impl Capabilities {
    /// Returns the `o=` options to request for a change detail
    pub fn detail_options(&self) -> Vec<&'static str> {
        let mut options = BASE_DETAIL_OPTIONS.to_vec();
        if self.reviewer_updates {
            options.push("REVIEWER_UPDATES");
        }
        options
    }
}

/// A resolved review server, ready to be crawled
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub base_url: Url,
    pub start_date: NaiveDate,
    pub capabilities: Capabilities,
}

impl Target {
    /// Builds a target from a configuration entry
    pub fn from_entry(entry: &TargetEntry) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&entry.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid url for target '{}': {}", entry.name, e))
        })?;

        Ok(Self {
            name: entry.name.clone(),
            base_url,
            start_date: entry.start_date,
            capabilities: Capabilities {
                reviewer_updates: entry.reviewer_updates,
            },
        })
    }

    /// Joins an API path onto the base URL, keeping any path prefix such as `/r`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Config {
    /// Looks up a target by name
    ///
    /// Fails if the name is unknown or the target's history starts on or
    /// after the configured end date.
    pub fn target(&self, name: &str) -> Result<Target, ConfigError> {
        match self.targets.iter().find(|t| t.name == name) {
            Some(entry) => {
                if entry.start_date >= self.crawl.end_date {
                    return Err(ConfigError::Validation(format!(
                        "target '{}' starts on {} which is not before the end date {}",
                        entry.name, entry.start_date, self.crawl.end_date
                    )));
                }
                Target::from_entry(entry)
            }
            None => Err(ConfigError::UnknownTarget {
                name: name.to_string(),
                known: self
                    .targets
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

fn entry(name: &str, url: &str, (y, m, d): (i32, u32, u32), reviewer_updates: bool) -> TargetEntry {
    TargetEntry {
        name: name.to_string(),
        url: url.to_string(),
        start_date: calendar_date(y, m, d),
        reviewer_updates,
    }
}

/// Returns the table of servers known out of the box
pub fn builtin_targets() -> Vec<TargetEntry> {
    vec![
        entry("openstack", "https://review.openstack.org", (2011, 7, 1), true),
        entry("chromium", "https://chromium-review.googlesource.com", (2011, 4, 1), true),
        entry("gerrit", "https://gerrit-review.googlesource.com", (2008, 7, 1), true),
        entry("android", "https://android-review.googlesource.com", (2008, 7, 1), true),
        entry("golang", "https://go-review.googlesource.com", (2014, 11, 1), true),
        entry("libreoffice", "https://gerrit.libreoffice.org", (2012, 3, 1), false),
        entry("eclipse", "https://git.eclipse.org/r", (2009, 10, 1), true),
        entry("wikimedia", "https://gerrit.wikimedia.org/r", (2011, 9, 1), true),
        entry("onap", "https://gerrit.onap.org/r", (2017, 1, 1), true),
    ]
}
