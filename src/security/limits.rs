//! Request and body size limits.
//!
//! # Responsibilities
//! - Enforce maximum URL (path + query) length
//! - Enforce maximum query string length
//! - Enforce maximum single-header size
//! - Enforce maximum request body size without buffering the body
//!
//! # Design Decisions
//! - Limits checked before any body byte is read (early rejection)
//! - Declared Content-Length above the ceiling is rejected outright
//! - Undeclared bodies are wrapped in a counting stream that fails as soon
//!   as the ceiling is crossed
//! - Every violation is a 413; the dimension is only reported to the audit log

use std::fmt;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Uri};
use futures_util::StreamExt;
use thiserror::Error;

use crate::config::SecurityPolicy;

/// Which size dimension a request exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDimension {
    Url,
    Query,
    Header,
    Body,
}

impl SizeDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeDimension::Url => "url",
            SizeDimension::Query => "query",
            SizeDimension::Header => "header",
            SizeDimension::Body => "body",
        }
    }
}

impl fmt::Display for SizeDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A size violation found before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeViolation {
    pub dimension: SizeDimension,
    pub limit: u64,
    pub actual: u64,
    /// Header name for `SizeDimension::Header`.
    pub header: Option<String>,
}

/// Thresholds for each size dimension.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    pub max_url_bytes: usize,
    pub max_query_bytes: usize,
    pub max_header_bytes: usize,
    pub max_body_bytes: u64,
}

impl SizeLimits {
    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self {
            max_url_bytes: policy.max_url_bytes,
            max_query_bytes: policy.max_query_bytes,
            max_header_bytes: policy.max_header_bytes,
            max_body_bytes: policy.max_body_bytes,
        }
    }

    /// Check URL, query, headers and declared body length.
    pub fn check(&self, uri: &Uri, headers: &HeaderMap) -> Result<(), SizeViolation> {
        let url_len = uri
            .path_and_query()
            .map(|pq| pq.as_str().len())
            .unwrap_or_else(|| uri.path().len());
        if url_len > self.max_url_bytes {
            return Err(SizeViolation {
                dimension: SizeDimension::Url,
                limit: self.max_url_bytes as u64,
                actual: url_len as u64,
                header: None,
            });
        }

        let query_len = uri.query().map(str::len).unwrap_or(0);
        if query_len > self.max_query_bytes {
            return Err(SizeViolation {
                dimension: SizeDimension::Query,
                limit: self.max_query_bytes as u64,
                actual: query_len as u64,
                header: None,
            });
        }

        for (name, value) in headers {
            let size = name.as_str().len() + value.len();
            if size > self.max_header_bytes {
                return Err(SizeViolation {
                    dimension: SizeDimension::Header,
                    limit: self.max_header_bytes as u64,
                    actual: size as u64,
                    header: Some(name.as_str().to_string()),
                });
            }
        }

        if let Some(declared) = declared_length(headers) {
            if declared > self.max_body_bytes {
                return Err(SizeViolation {
                    dimension: SizeDimension::Body,
                    limit: self.max_body_bytes,
                    actual: declared,
                    header: None,
                });
            }
        }

        Ok(())
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Error yielded by a limited body stream.
#[derive(Debug, Error)]
pub enum BodyLimitError {
    #[error("request body exceeded {limit} bytes")]
    Exceeded { limit: u64 },

    #[error("body transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// Wrap a body so reading stops once more than `limit` bytes arrive.
///
/// `on_exceeded` fires once, with the byte count seen, at the moment the
/// ceiling is crossed. The chunk that crossed it is dropped, not forwarded.
pub fn limit_body<F>(body: Body, limit: u64, on_exceeded: F) -> Body
where
    F: FnOnce(u64) + Send + 'static,
{
    let mut seen: u64 = 0;
    let mut hook = Some(on_exceeded);

    let stream = body
        .into_data_stream()
        .map(move |chunk| -> Result<Bytes, BodyLimitError> {
            let chunk = chunk?;
            seen = seen.saturating_add(chunk.len() as u64);
            if seen > limit {
                if let Some(hook) = hook.take() {
                    hook(seen);
                }
                return Err(BodyLimitError::Exceeded { limit });
            }
            Ok(chunk)
        });

    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn limits() -> SizeLimits {
        SizeLimits {
            max_url_bytes: 64,
            max_query_bytes: 16,
            max_header_bytes: 32,
            max_body_bytes: 10,
        }
    }

    #[test]
    fn test_within_limits() {
        let uri: Uri = "/videos/youtube/abc?quality=best".parse().unwrap();
        assert!(limits().check(&uri, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_query_limit() {
        let uri: Uri = "/v?quality=bestbestbestbest".parse().unwrap();
        let v = limits().check(&uri, &HeaderMap::new()).unwrap_err();
        assert_eq!(v.dimension, SizeDimension::Query);
        assert_eq!(v.limit, 16);
    }

    #[test]
    fn test_url_limit() {
        let uri: Uri = format!("/{}", "a".repeat(80)).parse().unwrap();
        let v = limits().check(&uri, &HeaderMap::new()).unwrap_err();
        assert_eq!(v.dimension, SizeDimension::Url);
        assert_eq!(v.actual, 81);
    }

    #[test]
    fn test_header_limit_names_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-padding", HeaderValue::from_str(&"p".repeat(40)).unwrap());
        let v = limits().check(&"/".parse().unwrap(), &headers).unwrap_err();
        assert_eq!(v.dimension, SizeDimension::Header);
        assert_eq!(v.header.as_deref(), Some("x-padding"));
    }

    #[test]
    fn test_declared_body_limit() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        let v = limits().check(&"/".parse().unwrap(), &headers).unwrap_err();
        assert_eq!(v.dimension, SizeDimension::Body);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(limits().check(&"/".parse().unwrap(), &headers).is_ok());
    }

    #[tokio::test]
    async fn test_limited_body_passes_small_payload() {
        let body = limit_body(Body::from("hello"), 10, |_| panic!("must not trip"));
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_limited_body_trips_once() {
        let seen = Arc::new(AtomicU64::new(0));
        let probe = seen.clone();
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"0123456")),
            Ok(Bytes::from_static(b"789ab")),
            Ok(Bytes::from_static(b"never-read")),
        ]);
        let body = limit_body(Body::from_stream(chunks), 10, move |n| {
            probe.store(n, Ordering::SeqCst);
        });

        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }
}
