//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + STREAM_GUARD_* environment
//!     → loader.rs (parse, deserialize, apply overrides)
//!     → validation.rs (semantic checks, every violation named)
//!     → GuardConfig (validated, immutable)
//!     → SecurityPolicy shared via Arc to all pipeline stages
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any violation is startup-fatal; the listener never binds

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    GuardConfig, ListenerConfig, ObservabilityConfig, SecurityPolicy, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, validate_policy, ConfigViolation};
