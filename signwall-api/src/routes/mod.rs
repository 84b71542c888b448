//! HTTP routes.
//!
//! | Route | Auth |
//! |---|---|
//! | `POST /login` | - |
//! | `POST /logout` | session |
//! | `POST /banner/sign` | session + sign limiter |
//! | `DELETE /banner/sign` | session |
//! | `GET /banner/image.png` | - |
//! | `GET /banner/leaderboard` | - |
//! | `GET /users/@me` | session |
//! | `GET /stats` | - |
//! | `GET /health/live`, `GET /health/ready` | - |
//! | `GET /metrics` | - |
//!
//! Every route sits behind the global per-IP limiter, observability, request
//! tracing, and CORS.

pub mod auth;
pub mod banner;
pub mod health;
pub mod stats;
pub mod users;

use axum::{
    http::{header, request::Parts, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::middleware::{rate_limit_middleware, session_middleware, sign_rate_limit_middleware};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the complete router over `state`.
pub fn create_api_router(state: AppState) -> Router {
    let sign_limiter = from_fn_with_state(state.rate_limits.clone(), sign_rate_limit_middleware);

    // Route layers run only for matched routes, so unknown paths still 404.
    let authenticated = Router::new()
        .route("/logout", post(auth::logout))
        .route(
            "/banner/sign",
            post(banner::sign)
                .route_layer(sign_limiter)
                .delete(banner::unsign),
        )
        .route("/users/@me", get(users::current_user))
        .route_layer(from_fn_with_state(state.auth.clone(), session_middleware));

    let public = Router::new()
        .route("/login", post(auth::login))
        .route("/banner/image.png", get(banner::image))
        .route("/banner/leaderboard", get(banner::leaderboard))
        .route("/stats", get(stats::stats))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics_handler));

    let cors = build_cors_layer(&state.config);

    // Execution order: CORS -> Trace -> Observability -> Rate Limiting -> Handler
    public
        .merge(authenticated)
        .layer(from_fn_with_state(state.rate_limits.clone(), rate_limit_middleware))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Origins are matched with [`ApiConfig::is_origin_allowed`]: any origin in
/// development when none are configured, only configured origins otherwise.
/// Methods and headers are listed explicitly so credentials stay allowed.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::RETRY_AFTER, HeaderName::from_static("x-cache")])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: no origins configured");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
    }

    let origins = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| origins.is_origin_allowed(origin))
                .unwrap_or(false)
        },
    ));

    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use axum::{body::Body, extract::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn preflight(config: &ApiConfig, origin: &str) -> Option<HeaderValue> {
        let app: Router = Router::new()
            .route("/stats", get(|| async { "ok" }))
            .layer(build_cors_layer(config));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/stats")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .cloned()
    }

    #[tokio::test]
    async fn test_cors_echoes_configured_origin_only() {
        let config = ApiConfig {
            environment: Environment::Production,
            cors_origins: vec!["https://signwall.example".to_string()],
            ..ApiConfig::default()
        };
        assert_eq!(
            preflight(&config, "https://signwall.example").await,
            Some(HeaderValue::from_static("https://signwall.example"))
        );
        assert_eq!(preflight(&config, "https://evil.example").await, None);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_in_development() {
        let config = ApiConfig {
            environment: Environment::Development,
            cors_origins: Vec::new(),
            ..ApiConfig::default()
        };
        assert_eq!(
            preflight(&config, "http://localhost:5173").await,
            Some(HeaderValue::from_static("http://localhost:5173"))
        );
    }
}
