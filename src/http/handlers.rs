//! Route handlers.
//!
//! Handlers run only after the security pipeline accepted the request, and
//! read its `ValidatedRequest` and `RequestMeta` from the extensions.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::json;

use crate::http::request::{request_meta, RequestMeta};
use crate::http::response::success;
use crate::lookup::VideoLookup;
use crate::security::errors::SecureErrorHandler;
use crate::security::validation::ValidatedRequest;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<dyn VideoLookup>,
    pub errors: Arc<SecureErrorHandler>,
}

impl AppState {
    pub fn new(lookup: Arc<dyn VideoLookup>, errors: Arc<SecureErrorHandler>) -> Self {
        Self { lookup, errors }
    }

    fn context(&self, request: &Request<Body>) -> Result<(RequestMeta, ValidatedRequest), Response> {
        let meta = request_meta(request);
        match request.extensions().get::<ValidatedRequest>() {
            Some(validated) => Ok((meta, validated.clone())),
            None => Err(self.errors.respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                &"handler reached without a validated request",
                &meta,
            )),
        }
    }
}

pub async fn health(request: Request<Body>) -> Response {
    let meta = request_meta(&request);
    success(
        json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
        meta.request_id,
    )
}

pub async fn get_video(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (meta, validated) = match state.context(&request) {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.lookup.video(&validated).await {
        Ok(info) => success(info, meta.request_id),
        Err(e) => state.errors.respond(e.status(), &e, &meta),
    }
}

pub async fn get_stream(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (meta, validated) = match state.context(&request) {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.lookup.stream(&validated).await {
        Ok(stream) => success(stream, meta.request_id),
        Err(e) => state.errors.respond(e.status(), &e, &meta),
    }
}

pub async fn get_playlist(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (meta, validated) = match state.context(&request) {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.lookup.playlist(&validated).await {
        Ok(playlist) => success(playlist, meta.request_id),
        Err(e) => state.errors.respond(e.status(), &e, &meta),
    }
}

pub async fn not_found(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.errors.reject(StatusCode::NOT_FOUND, &request_meta(&request))
}
