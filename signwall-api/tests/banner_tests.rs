//! Banner image, health, metrics, and the global limiter.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{body_json, request, test_config, TestApp};
use signwall_api::ApiConfig;
use signwall_test_utils::FakeCaptcha;

#[tokio::test]
async fn banner_is_rendered_once_then_served_fresh() {
    let app = TestApp::new();

    let first = app.send(request(Method::GET, "/banner/image.png", None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(first.headers()["x-cache"], "rendered");
    let bytes = axum::body::to_bytes(first.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], &[1u8; 8][..]);

    let second = app.send(request(Method::GET, "/banner/image.png", None)).await;
    assert_eq!(second.headers()["x-cache"], "fresh");
    assert_eq!(app.renderer.calls(), 1);
}

#[tokio::test]
async fn banner_render_failure_with_empty_cache_is_500() {
    let app = TestApp::new();
    app.renderer.set_failing(true);

    let response = app.send(request(Method::GET, "/banner/image.png", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Failed to generate banner");
}

#[tokio::test]
async fn banner_survives_cache_read_outage() {
    let app = TestApp::new();
    app.kv.fail_reads(true);

    let response = app.send(request(Method::GET, "/banner/image.png", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "rendered");
}

#[tokio::test]
async fn readiness_reports_store_outage() {
    let app = TestApp::new();

    let live = app.send(request(Method::GET, "/health/live", None)).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.send(request(Method::GET, "/health/ready", None)).await;
    assert_eq!(ready.status(), StatusCode::OK);

    app.kv.fail_reads(true);
    let ready = app.send(request(Method::GET, "/health/ready", None)).await;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(ready).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["details"]["kv_store"]["status"], "unhealthy");
    assert_eq!(body["details"]["signature_store"]["status"], "healthy");
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = TestApp::new();
    app.send(request(Method::GET, "/stats", None)).await;

    let response = app.send(request(Method::GET, "/metrics", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("signwall_http_requests_total"));
}

#[tokio::test]
async fn global_limiter_is_per_route() {
    let config = ApiConfig {
        rate_limit_per_window: 2,
        ..test_config()
    };
    let app = TestApp::build(config, FakeCaptcha::accepting());

    assert_eq!(app.send(request(Method::GET, "/stats", None)).await.status(), StatusCode::OK);
    assert_eq!(app.send(request(Method::GET, "/stats", None)).await.status(), StatusCode::OK);
    let limited = app.send(request(Method::GET, "/stats", None)).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));

    let other = app.send(request(Method::GET, "/health/live", None)).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::new();
    let response = app.send(request(Method::GET, "/nope", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
