//! Shared harness: the full router over in-memory stores and fake providers.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use signwall_api::{create_api_router, ApiConfig, AppDependencies, AppState};
use signwall_core::ProviderUser;
use signwall_test_utils::{
    test_user, FakeCaptcha, FakeIdentityProvider, FakeRenderer, FlakyKvStore,
    InMemorySignatureStore, RecordingNotifier,
};
use tower::ServiceExt;

/// Development config with a global limit high enough not to interfere.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        rate_limit_per_window: 1_000,
        ..ApiConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub identity: Arc<FakeIdentityProvider>,
    pub renderer: Arc<FakeRenderer>,
    pub captcha: Arc<FakeCaptcha>,
    pub feed: Arc<RecordingNotifier>,
    pub kv: Arc<FlakyKvStore>,
    pub signatures: Arc<InMemorySignatureStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(test_config(), FakeCaptcha::accepting())
    }

    pub fn build(config: ApiConfig, captcha: FakeCaptcha) -> Self {
        let identity = Arc::new(FakeIdentityProvider::new());
        let renderer = Arc::new(FakeRenderer::new());
        let captcha = Arc::new(captcha);
        let feed = Arc::new(RecordingNotifier::new("feed"));
        let kv = Arc::new(FlakyKvStore::new());
        let signatures = Arc::new(InMemorySignatureStore::new());

        let state = AppState::new(
            config,
            AppDependencies {
                kv: kv.clone(),
                signatures: signatures.clone(),
                identity: identity.clone(),
                renderer: renderer.clone(),
                captcha: captcha.clone(),
                notifiers: vec![feed.clone()],
            },
        );

        Self {
            router: create_api_router(state),
            identity,
            renderer,
            captcha,
            feed,
            kv,
            signatures,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Log in as `test_user(n)`; returns the user and a `Cookie` header value.
    pub async fn login(&self, n: u64) -> (ProviderUser, String) {
        let user = test_user(n);
        let code = format!("code-{}", n);
        self.identity.register_login(&code, &user);

        let response = self
            .send(json_request(
                Method::POST,
                "/login",
                None,
                serde_json::json!({ "code": code }),
            ))
            .await;
        assert_eq!(response.status(), 200, "login should succeed");
        let cookie = session_cookie_pair(&response).expect("login sets the session cookie");
        (user, cookie)
    }
}

/// `session_id=<id>` from a `Set-Cookie` header.
pub fn session_cookie_pair(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn request(method: Method, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
