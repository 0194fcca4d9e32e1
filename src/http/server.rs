//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wrap it in the security pipeline and the concurrency limit
//! - Serve over plain TCP or TLS with graceful shutdown
//!
//! # Layer Order
//! ```text
//! TraceLayer
//!   → GlobalConcurrencyLimit (listener.max_connections)
//!     → security pipeline (request deadline, stages, headers, panic boundary)
//!       → generic error bodies
//!         → routes
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::GuardConfig;
use crate::http::handlers::{self, AppState};
use crate::http::middleware::{generic_error_bodies, security_pipeline, SecurityPipeline};

/// Grace period for in-flight TLS connections after shutdown begins.
const TLS_DRAIN_SECS: u64 = 30;

/// Resource routes plus health and the 404 fallback.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/videos/{platform}/{video_id}", get(handlers::get_video))
        .route("/streams/{platform}/{video_id}", get(handlers::get_stream))
        .route("/playlists/{platform}/{playlist_id}", get(handlers::get_playlist))
        .fallback(handlers::not_found)
        .with_state(state)
}

/// Put `routes` behind the security pipeline and the serving limits.
///
/// The request deadline is owned by the pipeline (see
/// `SecurityPipeline::from_config`), so it also covers the body read.
pub fn protect(routes: Router, pipeline: Arc<SecurityPipeline>, config: &GuardConfig) -> Router {
    let errors = pipeline.error_handler();
    let inner = routes.layer(axum::middleware::from_fn_with_state(errors, generic_error_bodies));

    // A wrapping router so the pipeline sees (and may rewrite) the URI
    // before any route is matched.
    Router::new()
        .fallback_service(inner)
        .layer(axum::middleware::from_fn_with_state(pipeline, security_pipeline))
        .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the guarded API.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
}

impl HttpServer {
    pub fn new(config: GuardConfig, pipeline: Arc<SecurityPipeline>, state: AppState) -> Self {
        let router = protect(api_routes(state), pipeline, &config);
        Self { router, config }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Serve plain HTTP on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` resolves.
    pub async fn run_tls<F>(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: F,
    ) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
