//! Security audit trail.
//!
//! Audit entries are JSON lines appended to a dedicated file. They never go
//! through `tracing`, so the operational log and the audit stream are
//! separate sinks by construction.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityPolicy;
use crate::http::request::RequestMeta;
use crate::security::limits::SizeViolation;
use crate::security::sanitize::ThreatCategory;
use crate::security::validation::{truncate, MAX_ECHOED_VALUE_LEN};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Audit event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ValidationFailure,
    AccessDenied,
    SizeLimitExceeded,
    SuspiciousActivity,
    PanicRecovered,
    SanitizationTriggered,
}

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub event_type: AuditEventType,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub user_agent: String,
    pub details: Map<String, Value>,
    pub severity: Severity,
}

impl AuditLogEntry {
    pub fn new(
        meta: &RequestMeta,
        event_type: AuditEventType,
        severity: Severity,
        details: Value,
    ) -> Self {
        let details = match details {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        Self {
            timestamp: Utc::now(),
            request_id: meta.request_id.to_string(),
            event_type,
            client_ip: meta.client.to_string(),
            method: meta.method.clone(),
            path: meta.path.clone(),
            user_agent: meta.user_agent.clone(),
            details,
            severity,
        }
    }
}

/// Errors opening the audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit log {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Audit sink contract.
///
/// Implementors provide `record`; the per-category helpers build entries.
pub trait AuditLogger: Send + Sync {
    fn record(&self, entry: AuditLogEntry);

    /// Globally unique identifier for one inbound request.
    fn generate_request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn log_validation_failure(&self, meta: &RequestMeta, field: &str, value: &str, reason: &str) {
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::ValidationFailure,
            Severity::Warning,
            json!({
                "field": field,
                "value": truncate(value, MAX_ECHOED_VALUE_LEN),
                "reason": reason,
            }),
        ));
    }

    fn log_access_denied(&self, meta: &RequestMeta, reason: &str) {
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::AccessDenied,
            Severity::Warning,
            json!({ "reason": reason }),
        ));
    }

    fn log_size_limit_exceeded(&self, meta: &RequestMeta, violation: &SizeViolation) {
        let mut details = json!({
            "dimension": violation.dimension.as_str(),
            "limit": violation.limit,
            "actual": violation.actual,
        });
        if let (Some(header), Some(map)) = (&violation.header, details.as_object_mut()) {
            map.insert("header".to_string(), Value::String(header.clone()));
        }
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::SizeLimitExceeded,
            Severity::Warning,
            details,
        ));
    }

    fn log_suspicious_activity(&self, meta: &RequestMeta, field: &str, categories: &[ThreatCategory]) {
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::SuspiciousActivity,
            Severity::Error,
            json!({
                "field": field,
                "categories": categories,
                "action": "logged",
            }),
        ));
    }

    fn log_panic_recovered(&self, meta: &RequestMeta, panic_message: &str, stack_trace: &str) {
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::PanicRecovered,
            Severity::Critical,
            json!({
                "panic": panic_message,
                "stack_trace": stack_trace,
            }),
        ));
    }

    /// `action` is `cleaned` or `rejected`; `category` never includes the payload.
    fn log_sanitization_triggered(&self, meta: &RequestMeta, field: &str, category: &str, action: &str) {
        let severity = if action == "rejected" {
            Severity::Error
        } else {
            Severity::Warning
        };
        self.record(AuditLogEntry::new(
            meta,
            AuditEventType::SanitizationTriggered,
            severity,
            json!({
                "field": field,
                "category": category,
                "action": action,
            }),
        ));
    }
}

/// Append-only JSON-lines file sink.
pub struct FileAuditLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLogger {
    /// Open (creating parent directories) for append.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let open = || -> std::io::Result<File> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(&path)
        };
        let file = open().map_err(|source| AuditError::Open {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = ?path, "Audit log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLogger for FileAuditLogger {
    fn record(&self, entry: AuditLogEntry) {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize audit entry");
                return;
            }
        };
        line.push(b'\n');

        // One write_all per line under the lock keeps lines whole.
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(&line) {
            tracing::error!(error = %e, path = ?self.path, "Failed to write audit entry");
        }
    }
}

/// Sink used when auditing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn record(&self, _entry: AuditLogEntry) {}
}

/// In-memory sink, handy for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditLogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn record(&self, entry: AuditLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Build the sink the policy asks for. Disabled auditing creates no file.
pub fn from_policy(policy: &SecurityPolicy) -> Result<Arc<dyn AuditLogger>, AuditError> {
    if policy.audit_enabled {
        Ok(Arc::new(FileAuditLogger::open(&policy.audit_log_path)?))
    } else {
        tracing::warn!("Audit logging disabled");
        Ok(Arc::new(NoopAuditLogger))
    }
}
