//! Login and logout.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{clear_session_cookie, session_cookie, Authenticated};
use crate::services::Authenticator;

/// Body of `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub code: String,
}

/// POST /login - Exchange an OAuth2 code for a session cookie
pub async fn login(
    State(auth): State<Arc<Authenticator>>,
    State(config): State<Arc<ApiConfig>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable login payload");
        ApiError::invalid_input("Failed to parse JSON payload")
    })?;

    let outcome = auth.login(&request.code).await?;
    let cookie = session_cookie(&outcome.session_id, auth.session_ttl(), config.cookie_secure)?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(outcome.user),
    ))
}

/// POST /logout - End the caller's session
pub async fn logout(
    State(auth): State<Arc<Authenticator>>,
    State(config): State<Arc<ApiConfig>>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<impl IntoResponse> {
    auth.logout(&ctx).await?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(config.cookie_secure))],
    ))
}
