//! Request security pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → assign request ID, resolve client address
//!     → [catch_unwind boundary]
//!         → AccessStage       (403)
//!         → SizeStage         (413, bounded body read)
//!         → ValidationStage   (400 + field errors)
//!         → SanitizationStage (400, or audit-and-continue)
//!         → downstream router / handler
//!     → deadline passed? → 408 (body read and handler both cancelled)
//!     → panic? → SecureErrorHandler::recover_panic (500)
//!     → security headers + X-Request-ID on every response
//! ```
//!
//! # Design Decisions
//! - Stages are an ordered list; the first rejection ends the request
//!   and nothing after it runs
//! - The pipeline wraps the router (not individual routes) so a cleaned
//!   path is routed, not the raw one

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderValue, Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::{GuardConfig, SecurityPolicy};
use crate::http::request::{extract_route_parts, RequestMeta, X_REQUEST_ID};
use crate::http::response::{failure, Failure};
use crate::observability::metrics;
use crate::security::access_control::{
    extract_client_address, AccessDecision, CidrParseError, IpAccessController,
};
use crate::security::audit::AuditLogger;
use crate::security::errors::{generic_message, SecureErrorHandler};
use crate::security::headers::SecurityHeaders;
use crate::security::limits::{limit_body, SizeDimension, SizeLimits, SizeViolation};
use crate::security::sanitize::{PatternSanitizer, Sanitizer, ThreatCategory};
use crate::security::validation::{
    truncate, InputValidator, PolicyValidator, ValidatedRequest, ValidationError,
    MAX_ECHOED_VALUE_LEN,
};

/// Why a stage stopped the request.
#[derive(Debug)]
pub struct Rejection {
    pub status: StatusCode,
    /// Internal reason; only ever logged or redacted.
    pub reason: String,
    /// Field errors, echoed to the client as-is.
    pub errors: Option<Vec<ValidationError>>,
}

impl Rejection {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            errors: None,
        }
    }

    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            reason: format!("{} field(s) failed validation", errors.len()),
            errors: Some(errors),
        }
    }
}

pub enum StageOutcome {
    Continue,
    Reject(Rejection),
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, request: &mut Request<Body>, meta: &RequestMeta) -> StageOutcome;
}

/// IP allow/block enforcement.
pub struct AccessStage {
    controller: IpAccessController,
    audit: Arc<dyn AuditLogger>,
}

impl AccessStage {
    pub fn new(controller: IpAccessController, audit: Arc<dyn AuditLogger>) -> Self {
        Self { controller, audit }
    }
}

#[async_trait]
impl Stage for AccessStage {
    fn name(&self) -> &'static str {
        "access"
    }

    async fn run(&self, _request: &mut Request<Body>, meta: &RequestMeta) -> StageOutcome {
        match self.controller.check(meta.client.ip) {
            AccessDecision::Allowed => StageOutcome::Continue,
            decision => {
                self.audit.log_access_denied(meta, decision.as_str());
                StageOutcome::Reject(Rejection::new(
                    StatusCode::FORBIDDEN,
                    format!("client {} denied: {}", meta.client, decision.as_str()),
                ))
            }
        }
    }
}

/// URL, query, header and body ceilings.
pub struct SizeStage {
    limits: SizeLimits,
    audit: Arc<dyn AuditLogger>,
}

impl SizeStage {
    pub fn new(limits: SizeLimits, audit: Arc<dyn AuditLogger>) -> Self {
        Self { limits, audit }
    }
}

#[async_trait]
impl Stage for SizeStage {
    fn name(&self) -> &'static str {
        "size"
    }

    async fn run(&self, request: &mut Request<Body>, meta: &RequestMeta) -> StageOutcome {
        if let Err(violation) = self.limits.check(request.uri(), request.headers()) {
            self.audit.log_size_limit_exceeded(meta, &violation);
            return StageOutcome::Reject(Rejection::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "{} size {} exceeds limit {}",
                    violation.dimension, violation.actual, violation.limit
                ),
            ));
        }

        // Bounded read: at most max_body_bytes + one chunk is ever held.
        let limit = self.limits.max_body_bytes;
        let tripped = Arc::new(AtomicBool::new(false));
        let flag = tripped.clone();
        let audit = self.audit.clone();
        let hook_meta = meta.clone();
        let body = std::mem::take(request.body_mut());
        let limited = limit_body(body, limit, move |seen| {
            flag.store(true, Ordering::SeqCst);
            audit.log_size_limit_exceeded(
                &hook_meta,
                &SizeViolation {
                    dimension: SizeDimension::Body,
                    limit,
                    actual: seen,
                    header: None,
                },
            );
        });

        match axum::body::to_bytes(limited, usize::MAX).await {
            Ok(bytes) => {
                *request.body_mut() = Body::from(bytes);
                StageOutcome::Continue
            }
            Err(_) if tripped.load(Ordering::SeqCst) => StageOutcome::Reject(Rejection::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("body exceeds limit {}", limit),
            )),
            Err(e) => StageOutcome::Reject(Rejection::new(
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {}", e),
            )),
        }
    }
}

fn reject_fields(
    audit: &dyn AuditLogger,
    meta: &RequestMeta,
    errors: Vec<ValidationError>,
) -> StageOutcome {
    for error in &errors {
        audit.log_validation_failure(meta, &error.field, &error.value, &error.message);
    }
    StageOutcome::Reject(Rejection::validation(errors))
}

/// Field validation; stores the `ValidatedRequest` for handlers.
pub struct ValidationStage {
    validator: Arc<dyn InputValidator>,
    audit: Arc<dyn AuditLogger>,
}

impl ValidationStage {
    pub fn new(validator: Arc<dyn InputValidator>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { validator, audit }
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn run(&self, request: &mut Request<Body>, meta: &RequestMeta) -> StageOutcome {
        let parts = extract_route_parts(request.uri().path(), request.uri().query());
        match self.validator.validate_request(&parts.fields) {
            Ok(validated) => {
                request.extensions_mut().insert(validated);
                StageOutcome::Continue
            }
            Err(errors) => reject_fields(self.audit.as_ref(), meta, errors),
        }
    }
}

/// Path cleaning, identifier screening and general-parameter checks.
pub struct SanitizationStage {
    sanitizer: Arc<dyn Sanitizer>,
    validator: Arc<dyn InputValidator>,
    audit: Arc<dyn AuditLogger>,
}

impl SanitizationStage {
    pub fn new(
        sanitizer: Arc<dyn Sanitizer>,
        validator: Arc<dyn InputValidator>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            sanitizer,
            validator,
            audit,
        }
    }

    fn reject(&self, meta: &RequestMeta, field: &str, category: &str) -> StageOutcome {
        self.audit
            .log_sanitization_triggered(meta, field, category, "rejected");
        StageOutcome::Reject(Rejection::new(
            StatusCode::BAD_REQUEST,
            format!("sanitization rejected {}: {}", field, category),
        ))
    }

    fn first_injection(&self, value: &str) -> Option<ThreatCategory> {
        self.sanitizer
            .detect(value)
            .into_iter()
            .find(ThreatCategory::is_injection)
    }

    fn check_path(&self, request: &mut Request<Body>, meta: &RequestMeta) -> Option<StageOutcome> {
        let cleaned = match self.sanitizer.sanitize_path(request.uri().path()) {
            Ok(cleaned) => cleaned,
            Err(category) => return Some(self.reject(meta, "path", category.as_str())),
        };

        if let Some(category) = self.first_injection(&cleaned.path) {
            return Some(self.reject(meta, "path", category.as_str()));
        }

        if !cleaned.modified {
            return None;
        }

        self.audit.log_sanitization_triggered(
            meta,
            "path",
            ThreatCategory::PathTraversal.as_str(),
            "cleaned",
        );
        let Some(uri) = rewrite_path(request.uri(), &cleaned.path) else {
            return Some(self.reject(meta, "path", "invalid_encoding"));
        };
        tracing::debug!(
            request_id = %meta.request_id,
            original = %meta.path,
            cleaned = %uri.path(),
            "Request path cleaned"
        );
        *request.uri_mut() = uri;

        // The cleaned path may name different fields; validate them again.
        let parts = extract_route_parts(request.uri().path(), request.uri().query());
        match self.validator.validate_request(&parts.fields) {
            Ok(validated) => {
                request.extensions_mut().insert(validated);
                None
            }
            Err(errors) => Some(reject_fields(self.audit.as_ref(), meta, errors)),
        }
    }

    fn check_identifiers(&self, request: &Request<Body>, meta: &RequestMeta) -> Option<StageOutcome> {
        let validated = request.extensions().get::<ValidatedRequest>()?;
        let id_field = validated
            .resource
            .map(|r| r.id_field())
            .unwrap_or("id");
        let fields = [
            ("platform", validated.platform.as_deref()),
            (id_field, validated.id.as_deref()),
        ];

        for (field, value) in fields {
            let Some(value) = value else { continue };
            if let Some(category) = self.first_injection(value) {
                return Some(self.reject(meta, field, category.as_str()));
            }
        }
        None
    }

    fn check_params(&self, request: &Request<Body>, meta: &RequestMeta) -> Option<StageOutcome> {
        let parts = extract_route_parts(request.uri().path(), request.uri().query());

        for (index, (raw_key, raw_value)) in parts.params.iter().enumerate() {
            let key = match self.sanitizer.sanitize_param(raw_key) {
                Ok(key) => key,
                Err(category) => {
                    return Some(self.reject(meta, &format!("query[{}]", index), category.as_str()))
                }
            };
            let key_threats = self.sanitizer.detect(&key);
            let field = if key_threats.is_empty() {
                format!("query.{}", truncate(&key, MAX_ECHOED_VALUE_LEN))
            } else {
                format!("query[{}]", index)
            };

            let value = match self.sanitizer.sanitize_param(raw_value) {
                Ok(value) => value,
                Err(category) => return Some(self.reject(meta, &field, category.as_str())),
            };

            let mut threats = key_threats;
            for threat in self.sanitizer.detect(&value) {
                if !threats.contains(&threat) {
                    threats.push(threat);
                }
            }
            if !threats.is_empty() {
                tracing::warn!(
                    request_id = %meta.request_id,
                    field = %field,
                    categories = ?threats,
                    "Suspicious query parameter"
                );
                self.audit.log_suspicious_activity(meta, &field, &threats);
            }
        }
        None
    }
}

#[async_trait]
impl Stage for SanitizationStage {
    fn name(&self) -> &'static str {
        "sanitization"
    }

    async fn run(&self, request: &mut Request<Body>, meta: &RequestMeta) -> StageOutcome {
        self.check_path(request, meta)
            .or_else(|| self.check_identifiers(request, meta))
            .or_else(|| self.check_params(request, meta))
            .unwrap_or(StageOutcome::Continue)
    }
}

/// Re-encode a decoded path segment by segment, keeping the query.
fn rewrite_path(uri: &Uri, path: &str) -> Option<Uri> {
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let encoded = if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{}", encoded)
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", encoded, query),
        None => encoded,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Errors building the pipeline from a policy.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid access list entry: {0}")]
    AccessList(#[from] CidrParseError),

    #[error("invalid security header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("invalid redaction pattern: {0}")]
    Redaction(#[from] regex::Error),
}

/// The ordered stage list plus response decoration.
pub struct SecurityPipeline {
    stages: Vec<Box<dyn Stage>>,
    headers: SecurityHeaders,
    errors: Arc<SecureErrorHandler>,
    audit: Arc<dyn AuditLogger>,
    trusted_header: Option<String>,
    request_timeout: Option<Duration>,
}

impl SecurityPipeline {
    /// Build the default pipeline with the request deadline from `timeouts`.
    pub fn from_config(
        config: &GuardConfig,
        audit: Arc<dyn AuditLogger>,
    ) -> Result<Self, PipelineError> {
        Ok(Self::from_policy(&config.security, audit)?
            .with_request_timeout(Duration::from_secs(config.timeouts.request_secs)))
    }

    /// Build the default pipeline with the policy-driven components.
    pub fn from_policy(
        policy: &SecurityPolicy,
        audit: Arc<dyn AuditLogger>,
    ) -> Result<Self, PipelineError> {
        Self::with_components(
            policy,
            audit,
            Arc::new(PolicyValidator::from_policy(policy)),
            Arc::new(PatternSanitizer::new()),
        )
    }

    pub fn with_components(
        policy: &SecurityPolicy,
        audit: Arc<dyn AuditLogger>,
        validator: Arc<dyn InputValidator>,
        sanitizer: Arc<dyn Sanitizer>,
    ) -> Result<Self, PipelineError> {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(AccessStage::new(
                IpAccessController::from_policy(policy)?,
                audit.clone(),
            )),
            Box::new(SizeStage::new(SizeLimits::from_policy(policy), audit.clone())),
            Box::new(ValidationStage::new(validator.clone(), audit.clone())),
            Box::new(SanitizationStage::new(sanitizer, validator, audit.clone())),
        ];

        Ok(Self {
            stages,
            headers: SecurityHeaders::from_policy(policy)?,
            errors: Arc::new(SecureErrorHandler::new(policy, audit.clone())?),
            audit,
            trusted_header: policy.trusted_proxy_header.clone(),
            request_timeout: None,
        })
    }

    /// Bound every request, stages included, by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn error_handler(&self) -> Arc<SecureErrorHandler> {
        self.errors.clone()
    }

    /// Run one request through every stage and the downstream service.
    pub async fn handle(&self, mut request: Request<Body>, next: Next) -> Response {
        let start = Instant::now();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client =
            extract_client_address(request.headers(), peer, self.trusted_header.as_deref());
        let meta = RequestMeta::new(
            self.audit.generate_request_id(),
            client,
            request.method(),
            request.uri(),
            request.headers(),
        );
        request.extensions_mut().insert(meta.clone());

        let guarded = AssertUnwindSafe(self.run_stages(request, next, &meta)).catch_unwind();
        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    metrics::record_rejection("timeout");
                    Ok(self.errors.respond(
                        StatusCode::REQUEST_TIMEOUT,
                        &format!("request exceeded {}ms deadline", limit.as_millis()),
                        &meta,
                    ))
                }
            },
            None => guarded.await,
        };
        let mut response = match outcome {
            Ok(response) => response,
            Err(payload) => self.errors.recover_panic(payload, &meta),
        };

        self.headers.apply(response.headers_mut());
        if let Ok(value) = HeaderValue::from_str(&meta.request_id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        metrics::record_request(response.status().as_u16(), start);
        response
    }

    async fn run_stages(&self, mut request: Request<Body>, next: Next, meta: &RequestMeta) -> Response {
        for stage in &self.stages {
            if let StageOutcome::Reject(rejection) = stage.run(&mut request, meta).await {
                metrics::record_rejection(stage.name());
                return self.render(rejection, meta);
            }
        }
        next.run(request).await
    }

    fn render(&self, rejection: Rejection, meta: &RequestMeta) -> Response {
        match rejection.errors {
            Some(errors) => {
                tracing::info!(
                    request_id = %meta.request_id,
                    path = %meta.path,
                    errors = errors.len(),
                    "Request failed validation"
                );
                failure(
                    rejection.status,
                    Failure::new(generic_message(rejection.status), meta.request_id.clone())
                        .with_errors(errors),
                )
            }
            None => self.errors.respond(rejection.status, &rejection.reason, meta),
        }
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn security_pipeline(
    State(pipeline): State<Arc<SecurityPipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    pipeline.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::audit::{AuditEventType, MemoryAuditLogger};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(policy: SecurityPolicy) -> (Router, Arc<MemoryAuditLogger>) {
        let audit = Arc::new(MemoryAuditLogger::new());
        let pipeline = SecurityPipeline::from_policy(&policy, audit.clone()).unwrap();
        (wrap(pipeline), audit)
    }

    fn wrap(pipeline: SecurityPipeline) -> Router {
        let inner = Router::new()
            .route("/videos/{platform}/{id}", get(|| async { "ok" }))
            .route("/health", get(|| async { "healthy" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }),
            );
        Router::new()
            .fallback_service(inner)
            .layer(axum::middleware::from_fn_with_state(
                Arc::new(pipeline),
                security_pipeline,
            ))
    }

    fn timed_app(timeout: Duration) -> (Router, Arc<MemoryAuditLogger>) {
        let audit = Arc::new(MemoryAuditLogger::new());
        let pipeline = SecurityPipeline::from_policy(&SecurityPolicy::default(), audit.clone())
            .unwrap()
            .with_request_timeout(timeout);
        (wrap(pipeline), audit)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-real-ip", "198.51.100.7")
            .body(Body::empty())
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_stage_order() {
        let pipeline =
            SecurityPipeline::from_policy(&SecurityPolicy::default(), Arc::new(MemoryAuditLogger::new()))
                .unwrap();
        assert_eq!(
            pipeline.stage_names(),
            vec!["access", "size", "validation", "sanitization"]
        );
    }

    #[test]
    fn test_malformed_cidr_fails_construction() {
        let policy = SecurityPolicy {
            ip_blocklist: vec!["10.0.0.0/33".into()],
            ..Default::default()
        };
        let result = SecurityPipeline::from_policy(&policy, Arc::new(MemoryAuditLogger::new()));
        assert!(matches!(result, Err(PipelineError::AccessList(_))));
    }

    #[tokio::test]
    async fn test_clean_request_passes_with_headers() {
        let (app, audit) = app(SecurityPolicy::default());
        let response = app.oneshot(get_req("/videos/youtube/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert!(audit.entries().is_empty());
    }

    #[tokio::test]
    async fn test_traversal_cleaned_then_routed() {
        let (app, audit) = app(SecurityPolicy::default());
        let response = app
            .oneshot(get_req("/../videos/youtube/abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cleaned = audit.of_type(AuditEventType::SanitizationTriggered);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].details["action"], "cleaned");
    }

    #[tokio::test]
    async fn test_control_character_in_param_rejected() {
        let (app, audit) = app(SecurityPolicy::default());
        let response = app.oneshot(get_req("/health?note=a%00b")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json(response).await;
        assert_eq!(body["error"], "Invalid request");
        assert!(body.get("errors").is_none());

        let entries = audit.of_type(AuditEventType::SanitizationTriggered);
        assert_eq!(entries[0].details["category"], "null_or_control");
        assert_eq!(entries[0].details["action"], "rejected");
    }

    #[tokio::test]
    async fn test_suspicious_param_logged_not_rejected() {
        let (app, audit) = app(SecurityPolicy::default());
        let response = app
            .oneshot(get_req("/health?q=1%27%20UNION%20SELECT%20password"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let entries = audit.of_type(AuditEventType::SuspiciousActivity);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["field"], "query.q");
        assert_eq!(entries[0].details["categories"][0], "sql_injection");
    }

    #[tokio::test]
    async fn test_validation_errors_aggregated() {
        let (app, audit) = app(SecurityPolicy::default());
        let response = app
            .oneshot(get_req("/videos/nope/abc?quality=8k&country=USA"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json(response).await;
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0]["code"], "INVALID_PLATFORM");
        assert_eq!(audit.of_type(AuditEventType::ValidationFailure).len(), 3);
    }

    #[tokio::test]
    async fn test_oversized_streamed_body_rejected() {
        let policy = SecurityPolicy {
            max_body_bytes: 8,
            ..Default::default()
        };
        let (app, audit) = app(policy);
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(axum::body::Bytes::from_static(b"12345")),
            Ok(axum::body::Bytes::from_static(b"67890")),
        ]);
        let request = Request::builder()
            .uri("/health")
            .header("x-real-ip", "198.51.100.7")
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let entries = audit.of_type(AuditEventType::SizeLimitExceeded);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["dimension"], "body");
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let (app, _) = timed_app(Duration::from_millis(100));
        let stalled = futures_util::stream::pending::<Result<axum::body::Bytes, std::io::Error>>();
        let request = Request::builder()
            .uri("/health")
            .header("x-real-ip", "198.51.100.7")
            .body(Body::from_stream(stalled))
            .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(5), app.oneshot(request))
            .await
            .expect("stalled body was not cut off")
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.headers()["x-frame-options"], "DENY");

        let body = json(response).await;
        assert_eq!(body["error"], "Request timeout");
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let (app, _) = timed_app(Duration::from_millis(100));
        let response = tokio::time::timeout(Duration::from_secs(5), app.oneshot(get_req("/slow")))
            .await
            .expect("slow handler was not cut off")
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_from_config_sets_deadline() {
        let mut config = GuardConfig::default();
        config.timeouts.request_secs = 7;
        let pipeline =
            SecurityPipeline::from_config(&config, Arc::new(MemoryAuditLogger::new())).unwrap();
        assert_eq!(pipeline.request_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_rewrite_path_encodes_segments() {
        let uri: Uri = "/a/b?x=1".parse().unwrap();
        let rewritten = rewrite_path(&uri, "/videos/you tube/abc").unwrap();
        assert_eq!(rewritten.path(), "/videos/you%20tube/abc");
        assert_eq!(rewritten.query(), Some("x=1"));
    }
}
