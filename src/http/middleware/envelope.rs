//! Generic bodies for bare error responses.
//!
//! The router answers some failures with an empty body, such as its 405.
//! This middleware swaps those for the same generic JSON envelope every
//! other error uses.

use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::request::request_meta;
use crate::security::errors::SecureErrorHandler;

pub async fn generic_error_bodies(
    State(errors): State<Arc<SecureErrorHandler>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let meta = request_meta(&request);
    let response = next.run(request).await;

    let status = response.status();
    let bare = response.body().size_hint().exact() == Some(0);
    if !(bare && (status.is_client_error() || status.is_server_error())) {
        return response;
    }

    let mut replacement = errors.reject(status, &meta);
    if let Some(allow) = response.headers().get(header::ALLOW) {
        replacement.headers_mut().insert(header::ALLOW, allow.clone());
    }
    replacement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityPolicy;
    use crate::security::audit::NoopAuditLogger;
    use axum::http::{Method, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        let errors = Arc::new(
            SecureErrorHandler::new(&SecurityPolicy::default(), Arc::new(NoopAuditLogger)).unwrap(),
        );
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/empty", get(|| async { StatusCode::CONFLICT }))
            .layer(axum::middleware::from_fn_with_state(errors, generic_error_bodies))
    }

    #[tokio::test]
    async fn test_method_not_allowed_gets_envelope() {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(header::ALLOW));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_non_empty_bodies_left_alone() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_bare_client_error_gets_generic_body() {
        let request = Request::builder().uri("/empty").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["request_id"], "unknown");
    }
}
