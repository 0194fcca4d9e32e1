//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain: tokio TcpListener handed to axum::serve
//!     → TLS:   tls.rs (rustls config) handed to axum-server
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently
//! - Certificates are loaded once at startup; rotation requires a restart

pub mod tls;

pub use tls::load_tls_config;
