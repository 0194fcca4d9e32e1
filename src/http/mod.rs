//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, serving limits)
//!     → middleware/pipeline.rs (security stages, panic boundary)
//!     → request.rs (request ID, client context, route fields)
//!     → handlers.rs (lookup via VideoLookup)
//!     → response.rs (JSON envelopes)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use request::{RequestMeta, X_REQUEST_ID};
pub use server::{api_routes, protect, HttpServer};
