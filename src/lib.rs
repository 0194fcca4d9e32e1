//! Request-security gateway for a video-streaming proxy API.
//!
//! Every request passes IP access control, size limits, field validation
//! and sanitization before a handler runs; every response carries the
//! security header set; every security decision lands in the audit log.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod lookup;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::{GuardConfig, SecurityPolicy};
pub use http::middleware::SecurityPipeline;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
