//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build every security component in dependency order
//! - Start the metrics exporter when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Components initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{validate_config, ConfigError, GuardConfig};
use crate::http::handlers::AppState;
use crate::http::middleware::{PipelineError, SecurityPipeline};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::lookup::{CanonicalUrlLookup, VideoLookup};
use crate::net::load_tls_config;
use crate::observability::init_metrics;
use crate::security::audit::{self, AuditError, AuditLogger};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("audit log: {0}")]
    Audit(#[from] AuditError),

    #[error("security pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything the HTTP layer needs, built once from the policy.
pub struct Components {
    pub audit: Arc<dyn AuditLogger>,
    pub pipeline: Arc<SecurityPipeline>,
    pub state: AppState,
}

/// Validate the configuration and build the pipeline and handler state.
pub fn build_components(config: &GuardConfig) -> Result<Components, StartupError> {
    build_components_with(config, Arc::new(CanonicalUrlLookup::new()))
}

/// Same as `build_components`, with a caller-supplied lookup backend.
pub fn build_components_with(
    config: &GuardConfig,
    lookup: Arc<dyn VideoLookup>,
) -> Result<Components, StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let audit = audit::from_policy(&config.security)?;
    let pipeline = Arc::new(SecurityPipeline::from_config(config, audit.clone())?);
    let state = AppState::new(lookup, pipeline.error_handler());

    tracing::info!(
        stages = ?pipeline.stage_names(),
        ip_control = config.security.ip_control_enabled,
        audit = config.security.audit_enabled,
        detailed_errors = config.security.expose_error_details,
        "Security pipeline ready"
    );
    if config.security.expose_error_details {
        tracing::warn!("Detailed error responses enabled; do not use in production");
    }

    Ok(Components {
        audit,
        pipeline,
        state,
    })
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|e| StartupError::Bind {
        address: address.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })
}

/// Build, bind and serve until `shutdown` fires.
pub async fn serve(config: GuardConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let components = build_components(&config)?;

    if config.observability.metrics_enabled {
        let addr = parse_addr(&config.observability.metrics_address)?;
        init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config, components.pipeline, components.state);

    match tls {
        Some(tls) => {
            let rustls = load_tls_config(&tls).await.map_err(StartupError::Tls)?;
            let addr = parse_addr(&bind_address)?;
            server
                .run_tls(addr, rustls, shutdown.signalled())
                .await
                .map_err(StartupError::Serve)
        }
        None => {
            let listener = TcpListener::bind(&bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    address: bind_address.clone(),
                    source,
                })?;
            server
                .run(listener, shutdown.signalled())
                .await
                .map_err(StartupError::Serve)
        }
    }
}
