use crate::config::targets::builtin_targets;
use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

impl Config {
    /// Returns the default configuration with the built-in server table
    pub fn builtin() -> Self {
        Self {
            targets: builtin_targets(),
            ..Self::default()
        }
    }
}

/// Parses configuration from a TOML string
///
/// Targets declared in the document take precedence over built-in targets of
/// the same name; built-in targets that are not redeclared stay available.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    for builtin in builtin_targets() {
        if !config.targets.iter().any(|t| t.name == builtin.name) {
            config.targets.push(builtin);
        }
    }

    validate(&config)?;

    Ok(config)
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use gerry_harvest::config::load_config;
///
/// let config = load_config(Path::new("gerry.toml")).unwrap();
/// println!("Crawling up to {}", config.crawl.end_date);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
