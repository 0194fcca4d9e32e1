//! JSON response envelopes.
//!
//! # Responsibilities
//! - Wrap handler data in the success envelope
//! - Render failures with a generic message plus optional field errors
//!
//! # Design Decisions
//! - `success` is always the first key so clients can branch on it
//! - `errors` only carries validation failures; `details` only ever holds
//!   already-redacted text

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::security::validation::ValidationError;

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    pub data: T,
    pub request_id: String,
}

/// Failed response body.
#[derive(Debug, Serialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Failure {
    pub fn new(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            request_id: request_id.into(),
            errors: None,
            details: None,
        }
    }

    pub fn with_errors(mut self, errors: Vec<ValidationError>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn success<T: Serialize>(data: T, request_id: impl Into<String>) -> Response {
    let body = Success {
        success: true,
        data,
        request_id: request_id.into(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub fn failure(status: StatusCode, body: Failure) -> Response {
    (status, Json(body)).into_response()
}
