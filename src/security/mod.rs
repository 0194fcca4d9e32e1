//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (client address vs. allow/block CIDR lists)
//!     → limits.rs (URL, query, header and body size)
//!     → validation.rs (platform, identifiers, quality, country, mode)
//!     → sanitize.rs (path cleaning, parameter rejection, pattern detection)
//!     → Pass to routing
//!
//! Every response:
//!     → headers.rs (security header set)
//!
//! Side channels:
//!     → audit.rs (one JSON line per security decision)
//!     → errors.rs (generic client errors, panic recovery)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Every component is built once from the policy and never mutated

pub mod access_control;
pub mod audit;
pub mod errors;
pub mod headers;
pub mod limits;
pub mod sanitize;
pub mod validation;

pub use access_control::{AccessDecision, CidrParseError, CidrRange, ClientAddress, IpAccessController};
pub use audit::{AuditError, AuditEventType, AuditLogEntry, AuditLogger, FileAuditLogger, MemoryAuditLogger, NoopAuditLogger, Severity};
pub use errors::{generic_message, Redactor, SecureErrorHandler};
pub use headers::SecurityHeaders;
pub use limits::{SizeDimension, SizeLimits, SizeViolation};
pub use sanitize::{PatternSanitizer, RejectionCategory, Sanitizer, ThreatCategory};
pub use validation::{InputValidator, PolicyValidator, RequestFields, ValidatedRequest, ValidationError};
