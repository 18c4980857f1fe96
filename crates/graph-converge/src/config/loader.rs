use std::path::Path;

use super::schema::{
    ConvergeConfig, MAX_READ_BACK_BACKOFF_MS, MAX_REQUEST_TIMEOUT_SECS,
};
use crate::error::ConfigError;
use crate::kinds::KIND_NAMES;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ConvergeConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ConvergeConfig, ConfigError> {
    // An empty file is a valid, all-defaults config.
    let config: ConvergeConfig = if content.trim().is_empty() {
        ConvergeConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Checks every rule and reports all violations at once.
pub fn validate_config(config: &ConvergeConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let base_url = config.api.base_url.as_str();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        errors.push(format!("api.base_url '{}' must be an http(s) URL", base_url));
    }
    for (name, value) in [
        ("connect_timeout_secs", config.api.connect_timeout_secs),
        ("request_timeout_secs", config.api.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(format!("api.{} must be greater than 0", name));
        } else if value > MAX_REQUEST_TIMEOUT_SECS {
            errors.push(format!(
                "api.{} must be at most {} seconds, got {}",
                name, MAX_REQUEST_TIMEOUT_SECS, value
            ));
        }
    }

    errors.extend(config.timeouts.problems());

    if config.read_back.attempts == 0 {
        errors.push("read_back.attempts must be at least 1".to_string());
    }
    if config.read_back.backoff_ms > MAX_READ_BACK_BACKOFF_MS {
        errors.push(format!(
            "read_back.backoff_ms must be at most {}, got {}",
            MAX_READ_BACK_BACKOFF_MS, config.read_back.backoff_ms
        ));
    }

    for kind in config.permissions.keys() {
        if !KIND_NAMES.contains(&kind.as_str()) {
            errors.push(format!(
                "permissions: unknown kind '{}', expected one of: {}",
                kind,
                KIND_NAMES.join(", ")
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation {
            message: errors.join("; "),
        })
    }
}
