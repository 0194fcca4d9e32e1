//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, HSTS max-age floor)
//! - Parse every allow/block entry as a CIDR range
//! - Check header strings are emittable as header values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ConfigViolation>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;

use crate::config::schema::{GuardConfig, SecurityPolicy, MIN_HSTS_MAX_AGE};
use crate::security::access_control::CidrRange;

/// A single rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Dotted key of the offending value, e.g. `security.ip_blocklist[1]`.
    pub key: String,
    /// The constraint the value broke.
    pub constraint: String,
}

impl ConfigViolation {
    fn new(key: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            constraint: constraint.into(),
        }
    }
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.constraint)
    }
}

/// Validate the whole configuration, collecting every violation.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ConfigViolation>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ConfigViolation::new(
            "listener.bind_address",
            "must be a socket address such as 0.0.0.0:8080",
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ConfigViolation::new("listener.max_connections", "must be greater than 0"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ConfigViolation::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ConfigViolation::new("listener.tls.key_path", "must not be empty"));
        }
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ConfigViolation::new("timeouts.request_secs", "must be greater than 0"));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ConfigViolation::new(
            "observability.log_format",
            "must be \"pretty\" or \"json\"",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ConfigViolation::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if let Err(policy_errors) = validate_policy(&config.security) {
        errors.extend(policy_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the security policy on its own.
pub fn validate_policy(policy: &SecurityPolicy) -> Result<(), Vec<ConfigViolation>> {
    let mut errors = Vec::new();

    let positive = [
        ("security.max_video_id_length", policy.max_video_id_length as u64),
        ("security.max_playlist_id_length", policy.max_playlist_id_length as u64),
        ("security.max_body_bytes", policy.max_body_bytes),
        ("security.max_url_bytes", policy.max_url_bytes as u64),
        ("security.max_query_bytes", policy.max_query_bytes as u64),
        ("security.max_header_bytes", policy.max_header_bytes as u64),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(ConfigViolation::new(key, "must be greater than 0"));
        }
    }

    check_allowlist(&mut errors, "security.allowed_platforms", &policy.allowed_platforms);
    check_allowlist(&mut errors, "security.allowed_qualities", &policy.allowed_qualities);

    check_ranges(&mut errors, "security.ip_allowlist", &policy.ip_allowlist);
    check_ranges(&mut errors, "security.ip_blocklist", &policy.ip_blocklist);

    if let Some(header) = &policy.trusted_proxy_header {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ConfigViolation::new(
                "security.trusted_proxy_header",
                "must be a valid header name",
            ));
        }
    }

    if policy.hsts_enabled && policy.hsts_max_age < MIN_HSTS_MAX_AGE {
        errors.push(ConfigViolation::new(
            "security.hsts_max_age",
            format!("must be at least {} when HSTS is enabled", MIN_HSTS_MAX_AGE),
        ));
    }

    let header_strings = [
        ("security.content_security_policy", &policy.content_security_policy),
        ("security.referrer_policy", &policy.referrer_policy),
        ("security.permissions_policy", &policy.permissions_policy),
    ];
    for (key, value) in header_strings {
        if value.trim().is_empty() {
            errors.push(ConfigViolation::new(key, "must not be empty"));
        } else if HeaderValue::from_str(value).is_err() {
            errors.push(ConfigViolation::new(key, "must be a valid header value"));
        }
    }

    if policy.audit_enabled && policy.audit_log_path.trim().is_empty() {
        errors.push(ConfigViolation::new(
            "security.audit_log_path",
            "must not be empty when audit logging is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_allowlist(errors: &mut Vec<ConfigViolation>, key: &str, values: &[String]) {
    if values.is_empty() {
        errors.push(ConfigViolation::new(key, "must contain at least one entry"));
    }
    for (i, value) in values.iter().enumerate() {
        if value.trim().is_empty() {
            errors.push(ConfigViolation::new(format!("{}[{}]", key, i), "must not be empty"));
        }
    }
}

fn check_ranges(errors: &mut Vec<ConfigViolation>, key: &str, entries: &[String]) {
    for (i, entry) in entries.iter().enumerate() {
        if let Err(e) = entry.parse::<CidrRange>() {
            errors.push(ConfigViolation::new(format!("{}[{}]", key, i), e.to_string()));
        }
    }
}
