use std::path::Path;

use crate::config::schema::{TrackerConfig, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/tracker-config-v1.json");

/// Environment variable that overrides `api_base_url`.
pub const API_BASE_URL_ENV: &str = "TRACKER_API_BASE_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrackerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<TrackerConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: TrackerConfig = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn apply_env_overrides(config: &mut TrackerConfig) {
    if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
        if !url.trim().is_empty() {
            log::info!("Using backend URL from {}", API_BASE_URL_ENV);
            config.api_base_url = url;
        }
    }
}

fn validate_config(config: &TrackerConfig) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let url = config.api_base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("api_base_url must be an http(s) URL, got '{}'", url),
        });
    }

    if config.polling.backoff_max_ms < config.polling.interval_ms {
        return Err(ConfigError::Validation {
            message: "polling.backoff_max_ms must not be smaller than polling.interval_ms"
                .to_string(),
        });
    }

    Ok(())
}
