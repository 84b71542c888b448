//! The signing workflow through the full router.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{body_json, json_request, request, test_config, TestApp};
use serde_json::json;
use signwall_api::{ApiConfig, Environment};
use signwall_storage::SignatureStore;
use signwall_test_utils::FakeCaptcha;
use std::time::Duration;

#[tokio::test]
async fn sign_returns_receipt_with_position() {
    let app = TestApp::new();
    let (first, first_cookie) = app.login(1).await;
    let (_, second_cookie) = app.login(2).await;

    let response = app
        .send(json_request(Method::POST, "/banner/sign", Some(&first_cookie), json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = body_json(response).await;
    assert_eq!(receipt["user_id"], first.id);
    assert_eq!(receipt["position"], 1);
    assert!(receipt["referrer_id"].is_null());

    let response = app
        .send(json_request(Method::POST, "/banner/sign", Some(&second_cookie), json!({})))
        .await;
    assert_eq!(body_json(response).await["position"], 2);

    let stats = app.send(request(Method::GET, "/stats", None)).await;
    assert_eq!(body_json(stats).await["signatures"], 2);
}

#[tokio::test]
async fn second_sign_is_unprocessable() {
    let app = TestApp::new();
    let (_, cookie) = app.login(1).await;

    let first = app
        .send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(second).await;
    assert_eq!(body["code"], "ALREADY_SIGNED");
    assert_eq!(body["message"], "You have already signed the banner");
}

#[tokio::test]
async fn referral_is_kept_and_ranked() {
    let app = TestApp::new();
    let (referrer, referrer_cookie) = app.login(1).await;
    let (_, cookie) = app.login(2).await;

    app.send(json_request(Method::POST, "/banner/sign", Some(&referrer_cookie), json!({})))
        .await;
    let response = app
        .send(json_request(
            Method::POST,
            "/banner/sign",
            Some(&cookie),
            json!({ "referrer": referrer.id }),
        ))
        .await;
    assert_eq!(body_json(response).await["referrer_id"], referrer.id);

    let me = app
        .send(request(Method::GET, "/users/@me", Some(&referrer_cookie)))
        .await;
    let standing = body_json(me).await["signature"].clone();
    assert_eq!(standing["has_signed"], true);
    assert_eq!(standing["position"], 1);
    assert_eq!(standing["referral_count"], 1);
    assert_eq!(standing["referral_rank"], 1);

    let board = app
        .send(request(Method::GET, "/banner/leaderboard?limit=5", None))
        .await;
    let board = body_json(board).await;
    assert_eq!(board.as_array().map(Vec::len), Some(1));
    assert_eq!(board[0]["user_id"], referrer.id);
    assert_eq!(board[0]["rank"], 1);
}

#[tokio::test]
async fn malformed_body_is_rejected_without_writing() {
    let app = TestApp::new();
    let (user, cookie) = app.login(1).await;

    for body in [r#"{"referrer": "#, "referrer=oops"] {
        let response = app
            .send(
                axum::http::Request::builder()
                    .method(Method::POST)
                    .uri("/banner/sign")
                    .header(header::COOKIE, &cookie)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        let error = body_json(response).await;
        assert_eq!(error["code"], "INVALID_INPUT");
        assert_eq!(error["message"], "Failed to parse JSON payload");
    }
    assert!(!app.signatures.has_signed(&user.id).await.unwrap());
    assert!(app.feed.deliveries().is_empty());
}

#[tokio::test]
async fn empty_body_signs_without_referrer() {
    let app = TestApp::new();
    let (_, cookie) = app.login(1).await;

    let response = app.send(request(Method::POST, "/banner/sign", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["referrer_id"].is_null());
}

#[tokio::test]
async fn unsign_removes_signature() {
    let app = TestApp::new();
    let (_, cookie) = app.login(1).await;
    app.send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;

    let response = app.send(request(Method::DELETE, "/banner/sign", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let again = app.send(request(Method::DELETE, "/banner/sign", Some(&cookie))).await;
    assert_eq!(again.status(), StatusCode::NO_CONTENT);

    let stats = app.send(request(Method::GET, "/stats", None)).await;
    assert_eq!(body_json(stats).await["signatures"], 0);
}

#[tokio::test]
async fn feed_is_notified_after_commit() {
    let app = TestApp::new();
    let (user, cookie) = app.login(3).await;
    app.send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;

    assert!(app.feed.wait_for(1, Duration::from_secs(1)).await);
    assert_eq!(app.feed.deliveries(), vec![(user.id, 1)]);
}

#[tokio::test]
async fn captcha_is_required_in_production() {
    let config = ApiConfig {
        environment: Environment::Production,
        ..test_config()
    };
    let app = TestApp::build(config, FakeCaptcha::rejecting());
    let (user, cookie) = app.login(1).await;

    let missing = app
        .send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(missing).await["message"],
        "Failed to read capcha solution from payload"
    );

    let rejected = app
        .send(json_request(
            Method::POST,
            "/banner/sign",
            Some(&cookie),
            json!({ "captchaSolution": "attempt" }),
        ))
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let body = body_json(rejected).await;
    assert_eq!(body["message"], "Captcha verification failed");
    assert_eq!(body["details"]["errors"], json!(["solution_invalid"]));
    assert_eq!(app.captcha.solutions(), vec!["attempt".to_string()]);
    assert!(!app.signatures.has_signed(&user.id).await.unwrap());
    assert!(app.feed.deliveries().is_empty());
}

#[tokio::test]
async fn sign_attempts_are_rate_limited_per_session() {
    let app = TestApp::new();
    let (_, cookie) = app.login(1).await;
    let (_, other_cookie) = app.login(2).await;

    let statuses: Vec<StatusCode> = {
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app
                .send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
                .await;
            statuses.push(response.status());
        }
        statuses
    };
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::UNPROCESSABLE_ENTITY,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );

    let limited = app
        .send(json_request(Method::POST, "/banner/sign", Some(&cookie), json!({})))
        .await;
    assert!(limited.headers().contains_key(header::RETRY_AFTER));

    // Other sessions and unsigning are unaffected.
    let other = app
        .send(json_request(Method::POST, "/banner/sign", Some(&other_cookie), json!({})))
        .await;
    assert_eq!(other.status(), StatusCode::OK);
    let unsign = app.send(request(Method::DELETE, "/banner/sign", Some(&cookie))).await;
    assert_eq!(unsign.status(), StatusCode::NO_CONTENT);
}
