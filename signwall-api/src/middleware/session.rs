//! Session cookie authentication.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use signwall_core::{SessionId, SESSION_COOKIE_NAME};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::services::{Authenticator, RequestContext};

/// Value of the session cookie, if the request carries one.
pub fn read_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value issuing a session handle.
pub fn session_cookie(id: &SessionId, ttl: Duration, secure: bool) -> ApiResult<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}; SameSite=Lax",
        SESSION_COOKIE_NAME,
        id,
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal_error(format!("Invalid session cookie: {}", e)))
}

/// `Set-Cookie` value telling the browser to drop the session handle.
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("session_id=; Path=/; HttpOnly; Max-Age=0; SameSite=Lax; Secure")
    } else {
        HeaderValue::from_static("session_id=; Path=/; HttpOnly; Max-Age=0; SameSite=Lax")
    }
}

/// Require a live session.
///
/// Reads the `session_id` cookie, re-validates the stored token with the
/// identity provider, and injects the [`RequestContext`] into request
/// extensions. Missing, unknown, and revoked sessions get 401.
pub async fn session_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = read_session_cookie(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing session cookie"))?;
    let session_id =
        SessionId::parse(&raw).ok_or_else(|| ApiError::unauthorized("Invalid session cookie"))?;

    let context = auth.authenticate(&session_id).await?;
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The caller's [`RequestContext`].
///
/// ```ignore
/// async fn me(Authenticated(ctx): Authenticated) -> impl IntoResponse {
///     Json(ctx.user)
/// }
/// ```
///
/// `session_middleware` must be applied to the route; without it the
/// extractor fails with 500.
#[derive(Debug, Clone)]
pub struct Authenticated(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "RequestContext not found in request extensions. \
                     Ensure session_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for Authenticated {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
