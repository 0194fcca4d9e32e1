//! Secure error responses.
//!
//! # Responsibilities
//! - Log the full internal error with request context
//! - Answer the client with a generic message chosen by status code
//! - Optionally attach a redacted detail string (non-production only)
//! - Recover panics into a generic 500 with a critical audit entry
//!
//! # Design Decisions
//! - Redaction runs even when details are exposed
//! - Panic responses never carry details, whatever the policy says
//! - The panic hook stashes the panicking site's backtrace in a
//!   thread-local; recovery runs on the same thread right after unwinding

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Once};

use axum::http::StatusCode;
use axum::response::Response;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SecurityPolicy;
use crate::http::request::RequestMeta;
use crate::http::response::{failure, Failure};
use crate::security::audit::AuditLogger;

/// Generic client message for a status code.
pub fn generic_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Invalid request",
        401 => "Authentication required",
        403 => "Access denied",
        404 => "Resource not found",
        405 => "Method not allowed",
        408 => "Request timeout",
        413 => "Request too large",
        429 => "Too many requests",
        500 => "Internal server error",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        400..=499 => "Invalid request",
        _ => "Internal server error",
    }
}

static DSN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:postgres(?:ql)?|mysql|mariadb|mongodb(?:\+srv)?|rediss?|amqps?|sqlite|mssql|sqlserver|jdbc:[a-z]+)://\S*",
    )
    .expect("dsn pattern is valid")
});

static CREDENTIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:password|passwd|pwd|token|api[_-]?key|secret|access[_-]?key)["']?\s*[=:]\s*(?:"[^"]*"|'[^']*'|[^\s&;,]+)?"#,
    )
    .expect("credential pattern is valid")
});

static INTERNAL_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:internal|local|svc)\b(?::\d{1,5})?")
        .expect("internal host pattern is valid")
});

static LOOPBACK_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\blocalhost\b|\b127(?:\.\d{1,3}){3}\b|\b10(?:\.\d{1,3}){3}\b|\b192\.168(?:\.\d{1,3}){2}\b|\b172\.(?:1[6-9]|2\d|3[01])(?:\.\d{1,3}){2}\b|\b0\.0\.0\.0\b|\[::1\])(?::\d{1,5})?",
    )
    .expect("loopback pattern is valid")
});

static FILE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        // absolute, with an optional drive letter
        r"(?:[A-Za-z]:)?(?:[/\\][\w.-]+){2,}[/\\]?",
        // relative, ending in a file name with an extension
        r"|[\w.-]+(?:[/\\][\w.-]+)*[/\\][\w.-]*\.[A-Za-z0-9]+(?::\d+)*",
        // relative, three or more segments
        r"|[\w.-]+(?:[/\\][\w.-]+){2,}[/\\]?",
        // bare source file with a line number
        r"|[\w-]+\.(?:rs|go|py|js|ts|java|rb|php|c|cc|cpp|h)(?::\d+)+",
    ))
    .expect("file path pattern is valid")
});

static STACK_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)stack backtrace:?|panicked at|goroutine \d+(?: \[[^\]]*\])?|traceback \(most recent call last\):?|\bat [\w.$:<>]+\([^)]*\)|\b0x[0-9a-f]{8,}\b",
    )
    .expect("stack marker pattern is valid")
});

/// Pattern-based scrubber for error text.
#[derive(Debug, Clone)]
pub struct Redactor {
    service_names: Option<Regex>,
}

impl Redactor {
    pub fn new(service_names: &[String]) -> Result<Self, regex::Error> {
        let names: Vec<String> = service_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(regex::escape)
            .collect();
        let service_names = if names.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|")))?)
        };
        Ok(Self { service_names })
    }

    /// Scrub every sensitive fragment. Order matters: connection strings
    /// go first so their embedded credentials and hosts vanish with them.
    pub fn redact(&self, text: &str) -> String {
        let text = DSN.replace_all(text, "[REDACTED_DSN]");
        let text = CREDENTIAL.replace_all(&text, "[REDACTED_CREDENTIAL]");
        let text = INTERNAL_HOST.replace_all(&text, "[REDACTED_HOST]");
        let text = LOOPBACK_HOST.replace_all(&text, "[REDACTED_HOST]");
        let text = STACK_MARKER.replace_all(&text, "[REDACTED_TRACE]");
        let text = FILE_PATH.replace_all(&text, "[REDACTED_PATH]");
        match &self.service_names {
            Some(names) => names.replace_all(&text, "[REDACTED_SERVICE]").into_owned(),
            None => text.into_owned(),
        }
    }
}

/// Backtrace captured by the panic hook.
#[derive(Debug, Clone)]
pub struct PanicTrace {
    pub location: Option<String>,
    pub backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicTrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the capturing panic hook (once per process), chaining to the
/// previous hook.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = PanicTrace {
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Take the trace left by the most recent panic on this thread.
pub fn take_panic_trace() -> Option<PanicTrace> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Converts internal failures into generic client responses.
pub struct SecureErrorHandler {
    expose_details: bool,
    redactor: Redactor,
    audit: Arc<dyn AuditLogger>,
}

impl SecureErrorHandler {
    pub fn new(
        policy: &SecurityPolicy,
        audit: Arc<dyn AuditLogger>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            expose_details: policy.expose_error_details,
            redactor: Redactor::new(&policy.internal_service_names)?,
            audit,
        })
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Log `internal` in full, answer with the generic message for `status`.
    pub fn respond(
        &self,
        status: StatusCode,
        internal: &dyn fmt::Display,
        meta: &RequestMeta,
    ) -> Response {
        if status.is_server_error() {
            tracing::error!(
                request_id = %meta.request_id,
                client_ip = %meta.client,
                method = %meta.method,
                path = %meta.path,
                status = status.as_u16(),
                error = %internal,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %meta.request_id,
                client_ip = %meta.client,
                method = %meta.method,
                path = %meta.path,
                status = status.as_u16(),
                error = %internal,
                "Request rejected"
            );
        }

        let mut body = Failure::new(generic_message(status), meta.request_id.clone());
        if self.expose_details {
            body = body.with_details(self.redactor.redact(&internal.to_string()));
        }
        failure(status, body)
    }

    /// Answer with the generic message only, no detail, no error log.
    pub fn reject(&self, status: StatusCode, meta: &RequestMeta) -> Response {
        failure(
            status,
            Failure::new(generic_message(status), meta.request_id.clone()),
        )
    }

    /// Turn a caught panic into a generic 500 and a critical audit entry.
    pub fn recover_panic(&self, payload: Box<dyn Any + Send>, meta: &RequestMeta) -> Response {
        let message = panic_message(payload.as_ref());
        let (location, trace) = match take_panic_trace() {
            Some(t) => (t.location, t.backtrace),
            None => (None, Backtrace::force_capture().to_string()),
        };

        tracing::error!(
            request_id = %meta.request_id,
            client_ip = %meta.client,
            method = %meta.method,
            path = %meta.path,
            panic = %message,
            location = location.as_deref().unwrap_or("unknown"),
            backtrace = %trace,
            "Recovered from handler panic"
        );
        self.audit.log_panic_recovered(meta, &message, &trace);

        self.reject(StatusCode::INTERNAL_SERVER_ERROR, meta)
    }
}
