//! Login, logout, and session enforcement through the full router.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{body_json, json_request, request, TestApp};
use signwall_storage::KeyValueStore;

#[tokio::test]
async fn login_sets_http_only_cookie_and_returns_user() {
    let app = TestApp::new();
    let user = signwall_test_utils::test_user(1);
    app.identity.register_login("the-code", &user);

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            None,
            serde_json::json!({ "code": "the-code" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session_id="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=604800"));

    let body = body_json(response).await;
    assert_eq!(body["id"], user.id);
    assert_eq!(body["username"], user.username);
    assert_eq!(app.signatures.user(&user.id), Some(user));
}

#[tokio::test]
async fn login_rejections() {
    let app = TestApp::new();

    let empty = app
        .send(json_request(Method::POST, "/login", None, serde_json::json!({ "code": "" })))
        .await;
    assert_eq!(empty.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .send(json_request(Method::POST, "/login", None, serde_json::json!({ "code": "bogus" })))
        .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let malformed = app
        .send(
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert!(app.kv.inner().is_empty());
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = TestApp::new();
    for (method, uri) in [
        (Method::GET, "/users/@me"),
        (Method::POST, "/banner/sign"),
        (Method::DELETE, "/banner/sign"),
        (Method::POST, "/logout"),
    ] {
        let response = app.send(request(method.clone(), uri, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    let forged = app
        .send(request(Method::GET, "/users/@me", Some("session_id=0123456789abcdef0123456789abcdef")))
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn current_user_reports_standing() {
    let app = TestApp::new();
    let (user, cookie) = app.login(1).await;

    let response = app.send(request(Method::GET, "/users/@me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["id"], user.id);
    assert_eq!(body["signature"]["has_signed"], false);
    assert_eq!(body["signature"]["referral_count"], 0);
    assert!(body["signature"]["position"].is_null());
}

#[tokio::test]
async fn logout_clears_cookie_and_ends_session() {
    let app = TestApp::new();
    let (_, cookie) = app.login(1).await;

    let response = app.send(request(Method::POST, "/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let after = app.send(request(Method::GET, "/users/@me", Some(&cookie))).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_provider_token_ends_session() {
    let app = TestApp::new();
    let (user, cookie) = app.login(7).await;
    let session_key = format!("session:{}", cookie.trim_start_matches("session_id="));
    assert!(app.kv.get(&session_key).await.unwrap().is_some());

    app.identity.revoke(&format!("access-{}", user.id));

    let response = app.send(request(Method::GET, "/users/@me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.kv.get(&session_key).await.unwrap().is_none());
}
