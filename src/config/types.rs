use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Main configuration structure for Gerry-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Root directory that receives one sub-directory per target
    pub output_dir: PathBuf,

    /// Exclusive upper bound of every crawl (midnight of this day)
    pub end_date: NaiveDate,

    /// Optional ceiling on the number of passes over pending days
    pub max_passes: Option<u32>,

    /// Granularity of resumption
    pub resume: ResumeMode,
}

/// Builds a date from a compile-time constant
pub(crate) fn calendar_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| panic!("invalid built-in date {year}-{month}-{day}"))
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./gerry_data"),
            end_date: calendar_date(2018, 7, 1),
            max_passes: None,
            resume: ResumeMode::Day,
        }
    }
}

/// How completed work is recognized when a crawl is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    /// A day is done once its directory holds anything
    #[default]
    Day,

    /// A day is done once its completion marker exists; finished change
    /// files inside an unfinished day are kept and skipped
    Change,
}

impl ResumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Change => "change",
        }
    }
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "change" => Ok(Self::Change),
            other => Err(format!("unknown resume mode '{other}' (expected day or change)")),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub user_agent: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("gerry-harvest/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

/// Wait rules applied after the server signals overload
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BackoffConfig {
    pub rules: Vec<BackoffRule>,

    /// Use the server's Retry-After header when it asks for a longer wait
    pub honor_retry_after: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                BackoffRule::new(429, 60),
                BackoffRule::new(502, 5),
                BackoffRule::new(503, 10),
                BackoffRule::new(504, 5),
            ],
            honor_retry_after: true,
        }
    }
}

/// A single status-to-wait mapping
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackoffRule {
    pub status: u16,
    pub wait_secs: u64,
}

impl BackoffRule {
    pub fn new(status: u16, wait_secs: u64) -> Self {
        Self { status, wait_secs }
    }
}

/// A review server entry as written in the configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetEntry {
    /// Short name, also used as the output sub-directory
    pub name: String,

    /// Base URL of the Gerrit REST API
    pub url: String,

    /// First day with review data on this server
    pub start_date: NaiveDate,

    /// Whether the server understands the REVIEWER_UPDATES detail option
    #[serde(default = "default_true")]
    pub reviewer_updates: bool,
}

fn default_true() -> bool {
    true
}
