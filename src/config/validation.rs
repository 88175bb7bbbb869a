use crate::config::types::{BackoffConfig, Config, CrawlConfig, HttpConfig, TargetEntry};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_http_config(&config.http)?;
    validate_backoff_config(&config.backoff)?;
    validate_targets(&config.targets)?;
    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    if config.max_passes == Some(0) {
        return Err(ConfigError::Validation(
            "max_passes must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "HTTP timeouts must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    for rule in &config.rules {
        if !(100..=599).contains(&rule.status) {
            return Err(ConfigError::Validation(format!(
                "backoff status must be a valid HTTP status code, got {}",
                rule.status
            )));
        }
    }
    Ok(())
}

fn validate_targets(targets: &[TargetEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for target in targets {
        if target.name.is_empty() {
            return Err(ConfigError::Validation(
                "target name cannot be empty".to_string(),
            ));
        }

        // The name becomes a directory component
        if target.name.contains(['/', '\\']) || target.name.starts_with('.') {
            return Err(ConfigError::Validation(format!(
                "target name '{}' is not a valid directory name",
                target.name
            )));
        }

        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "target '{}' is declared more than once",
                target.name
            )));
        }

        let url = Url::parse(&target.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid url for target '{}': {}", target.name, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "target '{}' must use an http or https url",
                target.name
            )));
        }
    }

    Ok(())
}
