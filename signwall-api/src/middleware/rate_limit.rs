//! Rate limiting middleware.
//!
//! Two limiters share one keyed table:
//! - every route, keyed by client IP and route (15 requests / 10s by default)
//! - `POST /banner/sign`, keyed by session (2 attempts / 5 min by default)
//!
//! Rejections get 429 with a `Retry-After` header.

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::services::RequestContext;
use crate::telemetry::metrics;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Key for rate limiting.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    /// Any request, per client IP and route template
    Route { ip: IpAddr, route: String },
    /// Sign attempts, per session handle
    Sign(String),
}

impl RateLimitKey {
    fn limiter_name(&self) -> &'static str {
        match self {
            Self::Route { .. } => "global",
            Self::Sign(_) => "sign",
        }
    }
}

struct TrackedLimiter {
    limiter: Arc<DirectRateLimiter>,
    last_seen: Instant,
}

/// State for rate limiting middleware.
///
/// One limiter per key. A limiter idle for a whole window is back to a full
/// bucket, so [`RateLimitState::sweep_idle`] can drop it without changing any
/// decision.
#[derive(Clone)]
pub struct RateLimitState {
    enabled: bool,
    route_quota: Quota,
    route_window: Duration,
    sign_quota: Quota,
    sign_window: Duration,
    limiters: Arc<DashMap<RateLimitKey, TrackedLimiter>>,
}

/// `per_window` requests per `window`, all of which may arrive at once.
fn quota(per_window: u32, window: Duration) -> Quota {
    let burst = NonZeroU32::new(per_window).unwrap_or(NonZeroU32::MIN);
    let period = window / burst.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            route_quota: quota(config.rate_limit_per_window, config.rate_limit_window),
            route_window: config.rate_limit_window,
            sign_quota: quota(config.sign_limit_per_window, config.sign_limit_window),
            sign_window: config.sign_limit_window,
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn window(&self, key: &RateLimitKey) -> Duration {
        match key {
            RateLimitKey::Route { .. } => self.route_window,
            RateLimitKey::Sign(_) => self.sign_window,
        }
    }

    fn limiter(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        let mut entry = self.limiters.entry(key.clone()).or_insert_with(|| {
            let quota = match key {
                RateLimitKey::Route { .. } => self.route_quota,
                RateLimitKey::Sign(_) => self.sign_quota,
            };
            TrackedLimiter {
                limiter: Arc::new(RateLimiter::direct(quota)),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        entry.limiter.clone()
    }

    /// Take one cell for `key`.
    pub fn check(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        self.limiter(key).check().map_err(|not_until| {
            if let Some(metrics) = metrics() {
                metrics.record_rate_limited(key.limiter_name());
            }
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::debug!(limiter = key.limiter_name(), retry_after, "Rate limited");
            RateLimitError { retry_after }
        })
    }

    /// Number of keys currently holding a limiter.
    pub fn tracked_keys(&self) -> usize {
        self.limiters.len()
    }

    /// Drop limiters unused for at least their window. Returns how many went.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    fn sweep_idle_at(&self, now: Instant) -> usize {
        let before = self.limiters.len();
        self.limiters.retain(|key, tracked| {
            now.saturating_duration_since(tracked.last_seen) < self.window(key)
        });
        let removed = before.saturating_sub(self.limiters.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.limiters.len(), "Evicted idle rate limiters");
        }
        removed
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until a request would be admitted
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Extract client IP from request, considering proxy headers.
fn extract_client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Global limiter, keyed by client IP and matched route.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = RateLimitKey::Route {
        ip: extract_client_ip(&request),
        route,
    };
    state.check(&key)?;
    Ok(next.run(request).await)
}

/// Sign limiter, keyed by session. Must run inside `session_middleware`.
pub async fn sign_rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(context) = request.extensions().get::<RequestContext>() else {
        return Err(ApiError::internal_error("Sign limiter applied outside session middleware")
            .into_response());
    };
    let key = RateLimitKey::Sign(context.session_id.to_string());
    state.check(&key).map_err(IntoResponse::into_response)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn config(per_window: u32) -> ApiConfig {
        ApiConfig {
            rate_limit_per_window: per_window,
            rate_limit_window: Duration::from_secs(60),
            sign_limit_per_window: 2,
            sign_limit_window: Duration::from_secs(300),
            ..ApiConfig::default()
        }
    }

    fn app(state: RateLimitState) -> Router {
        Router::new()
            .route("/a", get(|| async { "a" }))
            .route("/b", get(|| async { "b" }))
            .layer(axum::middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    async fn status(app: &Router, uri: &str, ip: &str) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("x-forwarded-for", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_limit_is_per_ip_and_route() {
        let app = app(RateLimitState::new(&config(2)));

        assert_eq!(status(&app, "/a", "10.0.0.1").await, StatusCode::OK);
        assert_eq!(status(&app, "/a", "10.0.0.1").await, StatusCode::OK);
        assert_eq!(status(&app, "/a", "10.0.0.1").await, StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(status(&app, "/b", "10.0.0.1").await, StatusCode::OK);
        assert_eq!(status(&app, "/a", "10.0.0.2").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejection_has_retry_after() {
        let app = app(RateLimitState::new(&config(1)));
        assert_eq!(status(&app, "/a", "10.0.0.9").await, StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/a")
                    .header("x-forwarded-for", "10.0.0.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let state = RateLimitState::new(&ApiConfig {
            rate_limit_enabled: false,
            ..config(1)
        });
        let app = app(state);
        for _ in 0..5 {
            assert_eq!(status(&app, "/a", "10.0.0.3").await, StatusCode::OK);
        }
    }

    #[test]
    fn test_idle_limiters_are_evicted_after_their_window() {
        let state = RateLimitState::new(&config(15));
        let route = RateLimitKey::Route {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            route: "/stats".to_string(),
        };
        let session = RateLimitKey::Sign("session".to_string());
        state.check(&route).unwrap();
        state.check(&session).unwrap();
        assert_eq!(state.tracked_keys(), 2);

        // Route window is 60s, sign window 300s.
        assert_eq!(state.sweep_idle_at(Instant::now() + Duration::from_secs(30)), 0);
        assert_eq!(state.sweep_idle_at(Instant::now() + Duration::from_secs(61)), 1);
        assert_eq!(state.tracked_keys(), 1);
        assert_eq!(state.sweep_idle_at(Instant::now() + Duration::from_secs(301)), 1);
        assert_eq!(state.tracked_keys(), 0);
    }

    #[test]
    fn test_recently_used_limiter_survives_sweep() {
        let state = RateLimitState::new(&config(1));
        let key = RateLimitKey::Route {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            route: "/stats".to_string(),
        };
        state.check(&key).unwrap();
        assert_eq!(state.sweep_idle(), 0);
        // Still limited: the sweep did not reset the bucket.
        assert!(state.check(&key).is_err());
    }

    #[test]
    fn test_sign_quota_allows_two_per_session() {
        let state = RateLimitState::new(&config(15));
        let key = RateLimitKey::Sign("session".to_string());
        assert!(state.check(&key).is_ok());
        assert!(state.check(&key).is_ok());
        assert!(state.check(&key).is_err());
        assert!(state.check(&RateLimitKey::Sign("other".to_string())).is_ok());
    }
}
