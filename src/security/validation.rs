//! Input validation for video and playlist lookups.
//!
//! Each field is checked independently and every failure is collected, so
//! a client sees all of its mistakes in one response. Field errors are the
//! one error category that echoes input back: the values came from the
//! client in the first place.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::SecurityPolicy;

/// Longest echoed value in an error response or audit entry.
pub const MAX_ECHOED_VALUE_LEN: usize = 64;

/// Quality used when the client does not ask for one.
pub const DEFAULT_QUALITY: &str = "best";

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier pattern is valid"));

/// Machine-readable validation failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    Required,
    InvalidPlatform,
    MaxLengthExceeded,
    InvalidCharacters,
    InvalidQuality,
    InvalidCountry,
    InvalidMode,
}

/// A single field failure, surfaced verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    pub message: String,
    pub code: ValidationCode,
}

impl ValidationError {
    pub fn new(field: &str, value: &str, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.to_string(),
            value: truncate(value, MAX_ECHOED_VALUE_LEN),
            message: message.into(),
            code,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Truncate on a character boundary, marking the cut.
pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Resource a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Stream,
    Playlist,
}

impl ResourceKind {
    /// Field name of the identifier this resource requires.
    pub fn id_field(&self) -> &'static str {
        match self {
            ResourceKind::Video | ResourceKind::Stream => "video_id",
            ResourceKind::Playlist => "playlist_id",
        }
    }
}

/// How the stream should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Proxy,
    Direct,
}

/// Raw field values pulled from a request, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFields {
    pub resource: Option<ResourceKind>,
    pub platform: Option<String>,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
    pub quality: Option<String>,
    pub country: Option<String>,
    pub mode: Option<String>,
}

/// Normalized, validated values handed to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRequest {
    pub resource: Option<ResourceKind>,
    pub platform: Option<String>,
    pub id: Option<String>,
    pub quality: String,
    pub country: Option<String>,
    pub mode: StreamMode,
}

/// Field-level validation contract.
pub trait InputValidator: Send + Sync {
    /// Returns the normalized (lower-case) platform.
    fn validate_platform(&self, value: &str) -> Result<String, ValidationError>;

    fn validate_identifier(&self, field: &str, value: &str) -> Result<(), ValidationError>;

    /// Absent or empty yields the default quality.
    fn validate_quality(&self, value: Option<&str>) -> Result<String, ValidationError>;

    fn validate_country(&self, value: Option<&str>) -> Result<Option<String>, ValidationError>;

    fn validate_mode(&self, value: Option<&str>) -> Result<StreamMode, ValidationError>;

    /// Validate every field, aggregating all failures.
    fn validate_request(
        &self,
        fields: &RequestFields,
    ) -> Result<ValidatedRequest, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let platform = match (fields.resource, fields.platform.as_deref()) {
            (_, Some(p)) => self
                .validate_platform(p)
                .map_err(|e| errors.push(e))
                .ok(),
            (Some(_), None) => {
                errors.push(ValidationError::new(
                    "platform",
                    "",
                    "platform is required",
                    ValidationCode::Required,
                ));
                None
            }
            (None, None) => None,
        };

        let id = match fields.resource {
            Some(kind) => {
                let field = kind.id_field();
                let value = match kind {
                    ResourceKind::Playlist => fields.playlist_id.as_deref(),
                    _ => fields.video_id.as_deref(),
                }
                .unwrap_or_default();
                match self.validate_identifier(field, value) {
                    Ok(()) => Some(value.to_string()),
                    Err(e) => {
                        errors.push(e);
                        None
                    }
                }
            }
            None => None,
        };

        let quality = self
            .validate_quality(fields.quality.as_deref())
            .map_err(|e| errors.push(e))
            .unwrap_or_else(|_| DEFAULT_QUALITY.to_string());
        let country = self
            .validate_country(fields.country.as_deref())
            .map_err(|e| errors.push(e))
            .unwrap_or(None);
        let mode = self
            .validate_mode(fields.mode.as_deref())
            .map_err(|e| errors.push(e))
            .unwrap_or_default();

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedRequest {
            resource: fields.resource,
            platform,
            id,
            quality,
            country,
            mode,
        })
    }
}

/// Policy-driven validator.
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    platforms: HashSet<String>,
    qualities: HashSet<String>,
    max_video_id_length: usize,
    max_playlist_id_length: usize,
}

impl PolicyValidator {
    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self {
            platforms: policy
                .allowed_platforms
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
            qualities: policy
                .allowed_qualities
                .iter()
                .map(|q| q.trim().to_lowercase())
                .collect(),
            max_video_id_length: policy.max_video_id_length,
            max_playlist_id_length: policy.max_playlist_id_length,
        }
    }

    fn max_length(&self, field: &str) -> usize {
        if field == "playlist_id" {
            self.max_playlist_id_length
        } else {
            self.max_video_id_length
        }
    }
}

/// Treat present-but-blank optional values as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl InputValidator for PolicyValidator {
    fn validate_platform(&self, value: &str) -> Result<String, ValidationError> {
        let normalized = value.to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::new(
                "platform",
                value,
                "platform is required",
                ValidationCode::Required,
            ));
        }
        if !self.platforms.contains(&normalized) {
            return Err(ValidationError::new(
                "platform",
                value,
                "platform is not supported",
                ValidationCode::InvalidPlatform,
            ));
        }
        Ok(normalized)
    }

    fn validate_identifier(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::new(
                field,
                value,
                format!("{} is required", field),
                ValidationCode::Required,
            ));
        }
        let max = self.max_length(field);
        if value.chars().count() > max {
            return Err(ValidationError::new(
                field,
                value,
                format!("{} must be at most {} characters", field, max),
                ValidationCode::MaxLengthExceeded,
            ));
        }
        if !IDENTIFIER_PATTERN.is_match(value) {
            return Err(ValidationError::new(
                field,
                value,
                format!("{} may only contain letters, digits, '_' and '-'", field),
                ValidationCode::InvalidCharacters,
            ));
        }
        Ok(())
    }

    fn validate_quality(&self, value: Option<&str>) -> Result<String, ValidationError> {
        let Some(raw) = present(value) else {
            return Ok(DEFAULT_QUALITY.to_string());
        };
        let normalized = raw.to_lowercase();
        if self.qualities.contains(&normalized) {
            Ok(normalized)
        } else {
            Err(ValidationError::new(
                "quality",
                raw,
                "quality is not supported",
                ValidationCode::InvalidQuality,
            ))
        }
    }

    fn validate_country(&self, value: Option<&str>) -> Result<Option<String>, ValidationError> {
        let Some(raw) = present(value) else {
            return Ok(None);
        };
        let normalized = raw.to_uppercase();
        if normalized.len() == 2 && normalized.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Some(normalized))
        } else {
            Err(ValidationError::new(
                "country",
                raw,
                "country must be a two-letter code",
                ValidationCode::InvalidCountry,
            ))
        }
    }

    fn validate_mode(&self, value: Option<&str>) -> Result<StreamMode, ValidationError> {
        let Some(raw) = present(value) else {
            return Ok(StreamMode::default());
        };
        match raw.to_lowercase().as_str() {
            "proxy" => Ok(StreamMode::Proxy),
            "direct" => Ok(StreamMode::Direct),
            _ => Err(ValidationError::new(
                "mode",
                raw,
                "mode must be \"proxy\" or \"direct\"",
                ValidationCode::InvalidMode,
            )),
        }
    }
}
