//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Minimum HSTS max-age accepted by validation (one year).
pub const MIN_HSTS_MAX_AGE: u64 = 31_536_000;

/// Root configuration for the streaming gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request-security policy shared by every pipeline stage.
    pub security: SecurityPolicy,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Request-security policy.
///
/// Built once at startup, validated eagerly, then shared read-only
/// (behind an `Arc`) by every pipeline stage. Reconfiguration requires a
/// restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Maximum length of a video identifier.
    pub max_video_id_length: usize,
    /// Maximum length of a playlist identifier.
    pub max_playlist_id_length: usize,
    /// Platforms accepted in the `platform` field (case-insensitive).
    pub allowed_platforms: Vec<String>,
    /// Qualities accepted in the `quality` field (case-insensitive).
    pub allowed_qualities: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: u64,
    /// Maximum length of path plus query in bytes.
    pub max_url_bytes: usize,
    /// Maximum length of the raw query string in bytes.
    pub max_query_bytes: usize,
    /// Maximum size of a single header (name + value) in bytes.
    pub max_header_bytes: usize,

    /// Master switch for IP allow/block enforcement.
    pub ip_control_enabled: bool,
    /// Allowed CIDR ranges or bare addresses. Empty means allow all.
    pub ip_allowlist: Vec<String>,
    /// Blocked CIDR ranges or bare addresses. Always wins over the allowlist.
    pub ip_blocklist: Vec<String>,
    /// Header set by a trusted fronting proxy, consulted before
    /// `X-Real-IP` and `X-Forwarded-For`.
    pub trusted_proxy_header: Option<String>,

    pub hsts_enabled: bool,
    pub hsts_max_age: u64,
    pub content_security_policy: String,
    pub referrer_policy: String,
    pub permissions_policy: String,

    /// Write security events to the audit log.
    pub audit_enabled: bool,
    /// Audit log file (JSON lines, append-only).
    pub audit_log_path: String,

    /// Attach a redacted detail string to error responses. Non-production only.
    pub expose_error_details: bool,
    /// Service names scrubbed from any detail string.
    pub internal_service_names: Vec<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_video_id_length: 200,
            max_playlist_id_length: 200,
            allowed_platforms: ["youtube", "vimeo", "dailymotion", "twitch", "soundcloud"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_qualities: [
                "best", "worst", "2160p", "1440p", "1080p", "720p", "480p", "360p", "240p",
                "144p", "audio",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_body_bytes: 1024 * 1024, // 1MB
            max_url_bytes: 2048,
            max_query_bytes: 1024,
            max_header_bytes: 8192,
            ip_control_enabled: true,
            ip_allowlist: Vec::new(),
            ip_blocklist: Vec::new(),
            trusted_proxy_header: Some("CF-Connecting-IP".to_string()),
            hsts_enabled: true,
            hsts_max_age: MIN_HSTS_MAX_AGE,
            content_security_policy: "default-src 'self'; frame-ancestors 'none'".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "geolocation=(), microphone=(), camera=()".to_string(),
            audit_enabled: true,
            audit_log_path: "logs/audit.log".to_string(),
            expose_error_details: false,
            internal_service_names: ["yt-dlp", "redis", "postgres"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
