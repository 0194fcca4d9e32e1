//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ConfigViolation};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "STREAM_GUARD_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment override {key}={value:?}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join_violations(.0))]
    Validation(Vec<ConfigViolation>),
}

fn join_violations(errors: &[ConfigViolation]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, applying environment overrides.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GuardConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<GuardConfig, ConfigError> {
    let mut config = GuardConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `STREAM_GUARD_*` overrides using the given lookup function.
///
/// The lookup is injected so tests never touch the process environment.
pub fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(v) = get("BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = get("ALLOWED_PLATFORMS") {
        config.security.allowed_platforms = split_list(&v);
    }
    if let Some(v) = get("IP_ALLOWLIST") {
        config.security.ip_allowlist = split_list(&v);
    }
    if let Some(v) = get("IP_BLOCKLIST") {
        config.security.ip_blocklist = split_list(&v);
    }
    if let Some(v) = get("AUDIT_LOG_PATH") {
        config.security.audit_log_path = v;
    }
    if let Some(v) = get("AUDIT_ENABLED") {
        config.security.audit_enabled = parse_bool("AUDIT_ENABLED", &v)?;
    }
    if let Some(v) = get("EXPOSE_ERROR_DETAILS") {
        config.security.expose_error_details = parse_bool("EXPOSE_ERROR_DETAILS", &v)?;
    }
    if let Some(v) = get("HSTS_ENABLED") {
        config.security.hsts_enabled = parse_bool("HSTS_ENABLED", &v)?;
    }

    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key: format!("{}{}", ENV_PREFIX, name),
            value: value.to_string(),
        }),
    }
}
