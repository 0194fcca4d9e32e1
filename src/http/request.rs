//! Request identity and field extraction.
//!
//! # Responsibilities
//! - Carry the per-request ID and client context through the pipeline
//! - Pull platform/identifier/quality fields out of the raw path and query
//! - Split the query into known fields and general parameters
//!
//! # Design Decisions
//! - Extraction works on the raw URI, not on router matches, so the
//!   pipeline can run (and rewrite the path) before routing
//! - General parameters stay percent-encoded; the sanitizer decodes them
//!   strictly and rejects malformed encodings

use axum::http::{header, HeaderMap, Method, Request, Uri};

use crate::security::access_control::ClientAddress;
use crate::security::validation::{RequestFields, ResourceKind};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Context threaded through every audit call for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub request_id: String,
    pub client: ClientAddress,
    pub method: String,
    pub path: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn new(
        request_id: String,
        client: ClientAddress,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            request_id,
            client,
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            user_agent,
        }
    }
}

/// The pipeline's metadata for this request, or an anonymous stand-in
/// when the request never went through the pipeline.
pub fn request_meta<B>(request: &Request<B>) -> RequestMeta {
    match request.extensions().get::<RequestMeta>() {
        Some(meta) => meta.clone(),
        None => RequestMeta::new(
            "unknown".to_string(),
            ClientAddress::unknown(),
            request.method(),
            request.uri(),
            request.headers(),
        ),
    }
}

/// Fields and general parameters found in one request target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParts {
    pub fields: RequestFields,
    /// Query pairs other than the known fields, still percent-encoded.
    pub params: Vec<(String, String)>,
}

fn resource_for(segment: &str) -> Option<ResourceKind> {
    match segment {
        "videos" => Some(ResourceKind::Video),
        "streams" => Some(ResourceKind::Stream),
        "playlists" => Some(ResourceKind::Playlist),
        _ => None,
    }
}

fn decode_lossy(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Split a request target into validator fields and general parameters.
///
/// Resource routes are `/{videos|streams}/{platform}/{video_id}` and
/// `/playlists/{platform}/{playlist_id}`; shorter prefixes still yield a
/// resource so missing segments surface as `REQUIRED` errors.
pub fn extract_route_parts(path: &str, query: Option<&str>) -> RouteParts {
    let mut parts = RouteParts::default();

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(kind) = segments.first().and_then(|s| resource_for(s)) {
        if segments.len() <= 3 {
            parts.fields.resource = Some(kind);
            parts.fields.platform = segments.get(1).map(|s| decode_lossy(s));
            let id = segments.get(2).map(|s| decode_lossy(s));
            match kind {
                ResourceKind::Playlist => parts.fields.playlist_id = id,
                ResourceKind::Video | ResourceKind::Stream => parts.fields.video_id = id,
            }
        }
    }

    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let slot = match key {
            "quality" => &mut parts.fields.quality,
            "country" => &mut parts.fields.country,
            "mode" => &mut parts.fields.mode,
            _ => {
                parts.params.push((key.to_string(), value.to_string()));
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(decode_lossy(value));
        }
    }

    parts
}
