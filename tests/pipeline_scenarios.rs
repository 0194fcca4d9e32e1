//! End-to-end scenarios through the full protected router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use common::{body_json, build_app, build_app_with, get_from, send, test_config, FailingLookup, SECURITY_HEADERS};
use stream_guard::http::X_REQUEST_ID;
use stream_guard::security::errors::install_panic_hook;
use stream_guard::security::AuditEventType;

const CLIENT: &str = "198.51.100.7";

#[tokio::test]
async fn test_valid_video_request_passes_with_headers() {
    let app = build_app(&test_config());
    let response = send(&app.router, get_from("/videos/youtube/dQw4w9WgXcQ", CLIENT)).await;

    assert_eq!(response.status(), StatusCode::OK);
    for name in SECURITY_HEADERS {
        assert!(response.headers().contains_key(name), "missing {}", name);
    }
    let request_id = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["request_id"], request_id.as_str());
    assert_eq!(body["data"]["platform"], "youtube");
    assert_eq!(body["data"]["video_id"], "dQw4w9WgXcQ");
    assert_eq!(
        body["data"]["source_url"],
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
    );
    assert_eq!(app.lookup.calls(), 1);
    assert!(app.audit.entries().is_empty());
}

#[tokio::test]
async fn test_unknown_platform_rejected() {
    let app = build_app(&test_config());
    let response = send(&app.router, get_from("/videos/not_a_platform/abc", CLIENT)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0]["field"], "platform");
    assert_eq!(body["errors"][0]["code"], "INVALID_PLATFORM");
    assert_eq!(app.lookup.calls(), 0);

    let failures = app.audit.of_type(AuditEventType::ValidationFailure);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].details["field"], "platform");
}

#[tokio::test]
async fn test_overlong_video_id_rejected() {
    let app = build_app(&test_config());
    let uri = format!("/videos/youtube/{}", "a".repeat(201));
    let response = send(&app.router, get_from(&uri, CLIENT)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["field"], "video_id");
    assert_eq!(body["errors"][0]["code"], "MAX_LENGTH_EXCEEDED");
}

#[tokio::test]
async fn test_blocklisted_client_denied() {
    let mut config = test_config();
    config.security.ip_blocklist = vec!["10.0.0.0/24".into()];
    let app = build_app(&config);

    let response = send(&app.router, get_from("/videos/youtube/dQw4w9WgXcQ", "10.0.0.5")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    for name in SECURITY_HEADERS {
        assert!(response.headers().contains_key(name), "missing {}", name);
    }
    let body = body_json(response).await;
    assert_eq!(body["error"], "Access denied");
    assert_eq!(app.lookup.calls(), 0);

    let denied = app.audit.of_type(AuditEventType::AccessDenied);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].client_ip, "10.0.0.5");
    assert_eq!(denied[0].request_id, body["request_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_trusted_header_wins_over_real_ip() {
    let mut config = test_config();
    config.security.ip_blocklist = vec!["10.0.0.0/24".into()];
    let app = build_app(&config);

    let request = Request::builder()
        .uri("/health")
        .header("cf-connecting-ip", "10.0.0.9")
        .header("x-real-ip", CLIENT)
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ipv6_allowlist() {
    let mut config = test_config();
    config.security.ip_allowlist = vec!["2001:db8::/32".into()];
    let app = build_app(&config);

    let inside = send(&app.router, get_from("/health", "2001:db8::1")).await;
    assert_eq!(inside.status(), StatusCode::OK);

    let outside = send(&app.router, get_from("/health", "2001:db9::1")).await;
    assert_eq!(outside.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_oversized_query_rejected() {
    let app = build_app(&test_config());
    let uri = format!("/videos/youtube/dQw4w9WgXcQ?q={}", "a".repeat(1998));
    let response = send(&app.router, get_from(&uri, CLIENT)).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Request too large");
    assert_eq!(app.lookup.calls(), 0);

    let violations = app.audit.of_type(AuditEventType::SizeLimitExceeded);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].details["dimension"], "query");
    assert_eq!(violations[0].details["limit"], 1024);
}

#[tokio::test]
async fn test_oversized_header_rejected() {
    let app = build_app(&test_config());
    let request = Request::builder()
        .uri("/videos/youtube/dQw4w9WgXcQ")
        .header("x-real-ip", CLIENT)
        .header("x-padding", "p".repeat(9000))
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.lookup.calls(), 0);

    let violations = app.audit.of_type(AuditEventType::SizeLimitExceeded);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].details["dimension"], "header");
}

#[tokio::test]
async fn test_declared_body_over_limit_rejected() {
    let mut config = test_config();
    config.security.max_body_bytes = 16;
    let app = build_app(&config);
    let request = Request::builder()
        .uri("/videos/youtube/dQw4w9WgXcQ")
        .header("x-real-ip", CLIENT)
        .header("content-length", "64")
        .body(Body::from(vec![b'x'; 64]))
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.lookup.calls(), 0);

    let violations = app.audit.of_type(AuditEventType::SizeLimitExceeded);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].details["dimension"], "body");
    assert_eq!(violations[0].details["limit"], 16);
}

#[tokio::test]
async fn test_stalled_body_hits_request_deadline() {
    let mut config = test_config();
    config.timeouts.request_secs = 1;
    let app = build_app(&config);
    let stalled = futures_util::stream::pending::<Result<axum::body::Bytes, std::io::Error>>();
    let request = Request::builder()
        .uri("/videos/youtube/dQw4w9WgXcQ")
        .header("x-real-ip", CLIENT)
        .body(Body::from_stream(stalled))
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), send(&app.router, request))
        .await
        .expect("stalled body held the request open");

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    for name in SECURITY_HEADERS {
        assert!(response.headers().contains_key(name), "missing {}", name);
    }
    assert!(response.headers().contains_key(X_REQUEST_ID));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Request timeout");
    assert_eq!(app.lookup.calls(), 0);
}

#[tokio::test]
async fn test_panic_becomes_generic_500() {
    install_panic_hook();
    let app = build_app(&test_config());
    let response = send(&app.router, get_from("/boom", CLIENT)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-content-type-options"));

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Internal server error");
    assert!(body.get("details").is_none());
    assert!(!body.to_string().contains("boom"));

    let panics = app.audit.of_type(AuditEventType::PanicRecovered);
    assert_eq!(panics.len(), 1);
    assert!(panics[0].details["panic"].as_str().unwrap().contains("boom"));
    assert_eq!(panics[0].request_id, body["request_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_unknown_route_is_generic_404() {
    let app = build_app(&test_config());
    let response = send(&app.router, get_from("/admin/secrets", CLIENT)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Resource not found");
}

#[tokio::test]
async fn test_wrong_method_is_generic_405() {
    let app = build_app(&test_config());
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/health")
        .header("x-real-ip", CLIENT)
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Method not allowed");
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let app = build_app(&test_config());
    let first = send(&app.router, get_from("/health", CLIENT)).await;
    let second = send(&app.router, get_from("/health", CLIENT)).await;
    assert_ne!(first.headers()[X_REQUEST_ID], second.headers()[X_REQUEST_ID]);
}

#[tokio::test]
async fn test_stream_and_playlist_routes() {
    let app = build_app(&test_config());

    let response = send(
        &app.router,
        get_from("/streams/vimeo/76979871?quality=720p&mode=direct", CLIENT),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["quality"], "720p");
    assert_eq!(body["data"]["mode"], "direct");

    let response = send(
        &app.router,
        get_from("/playlists/youtube/PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf", CLIENT),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["playlist_id"], "PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf");
}

#[tokio::test]
async fn test_detailed_errors_are_redacted() {
    let mut config = test_config();
    config.security.expose_error_details = true;
    let (router, _audit) = build_app_with(&config, Arc::new(FailingLookup));

    let response = send(&router, get_from("/videos/youtube/abc", CLIENT)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
    let details = body["details"].as_str().unwrap();
    for leaked in ["hunter2", "10.1.2.3", "s3cr3t", "cache/shards", "videos.db"] {
        assert!(!details.contains(leaked), "{} leaked in {}", leaked, details);
    }
}

#[tokio::test]
async fn test_production_errors_carry_no_details() {
    let (router, _audit) = build_app_with(&test_config(), Arc::new(FailingLookup));

    let response = send(&router, get_from("/videos/youtube/abc", CLIENT)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body.get("details").is_none());

    let response = send(&router, get_from("/streams/youtube/gone", CLIENT)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Resource not found");
}
