use crate::config::types::{Config, HttpConfig, StorageConfig, UpdaterConfig};
use crate::ConfigError;

/// Longest delay accepted for probe and page throttling (one minute)
const MAX_DELAY_MS: u64 = 60_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_http_config(&config.http)?;
    validate_updater_config(&config.updater)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates HTTP configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates discovery tuning
fn validate_updater_config(config: &UpdaterConfig) -> Result<(), ConfigError> {
    validate_threshold("cluster_threshold", config.cluster_threshold)?;
    validate_threshold("link_threshold", config.link_threshold)?;

    if config.probe_delay_ms > MAX_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "probe_delay_ms must be <= {}ms, got {}ms",
            MAX_DELAY_MS, config.probe_delay_ms
        )));
    }

    if config.page_delay_ms > MAX_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "page_delay_ms must be <= {}ms, got {}ms",
            MAX_DELAY_MS, config.page_delay_ms
        )));
    }

    if config.auto_check_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "auto_check_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Similarity thresholds live in (0, 1]
fn validate_threshold(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}
