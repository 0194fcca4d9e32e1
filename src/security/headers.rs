//! Security response headers.
//!
//! # Responsibilities
//! - Build the fixed + policy-driven header set once at startup
//! - Stamp it onto every response, including rejections
//!
//! # Design Decisions
//! - Pure function of the policy; no per-request state
//! - HSTS only when enabled, always with includeSubDomains and preload

use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::SecurityPolicy;

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Precomputed security header set.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_policy(
        policy: &SecurityPolicy,
    ) -> Result<Self, axum::http::header::InvalidHeaderValue> {
        let mut headers = vec![
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
            (
                CONTENT_SECURITY_POLICY,
                HeaderValue::from_str(&policy.content_security_policy)?,
            ),
            (REFERRER_POLICY, HeaderValue::from_str(&policy.referrer_policy)?),
            (PERMISSIONS_POLICY, HeaderValue::from_str(&policy.permissions_policy)?),
        ];

        if policy.hsts_enabled {
            headers.push((
                STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_str(&hsts_value(policy.hsts_max_age))?,
            ));
        }

        Ok(Self { headers })
    }

    /// Overwrite any same-named header already on the response.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

pub fn hsts_value(max_age: u64) -> String {
    format!("max-age={}; includeSubDomains; preload", max_age)
}
