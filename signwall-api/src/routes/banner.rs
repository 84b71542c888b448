//! Banner routes: signing, the rendered image, and the referral leaderboard.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use signwall_core::{LeaderboardEntry, SignatureReceipt};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Authenticated;
use crate::services::{ArtifactService, SignRequest, SigningService};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// POST /banner/sign - Sign the banner as the caller
///
/// An empty body is the same as `{}`. Anything else must decode as
/// [`SignRequest`] or the request is rejected before any write.
pub async fn sign(
    State(signing): State<Arc<SigningService>>,
    Authenticated(ctx): Authenticated,
    body: Bytes,
) -> ApiResult<Json<SignatureReceipt>> {
    let request = parse_sign_request(&body).map_err(|e| {
        tracing::debug!(user_id = %ctx.user_id(), error = %e, "Unreadable sign payload");
        ApiError::invalid_input("Failed to parse JSON payload")
    })?;

    let receipt = signing.sign(&ctx, request).await?;
    Ok(Json(receipt))
}

fn parse_sign_request(body: &[u8]) -> Result<SignRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SignRequest::default());
    }
    serde_json::from_slice(body)
}

/// DELETE /banner/sign - Remove the caller's signature
pub async fn unsign(
    State(signing): State<Arc<SigningService>>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<StatusCode> {
    signing.unsign(ctx.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /banner/image.png - The current banner
pub async fn image(State(artifacts): State<Arc<ArtifactService>>) -> ApiResult<Response> {
    let served = artifacts.serve().await?;

    let content_type = HeaderValue::from_str(&served.artifact.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (HeaderName::from_static("x-cache"), HeaderValue::from_static(served.source.as_str())),
        ],
        served.artifact.bytes,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

impl LeaderboardQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT)
    }
}

/// GET /banner/leaderboard - Top referrers
pub async fn leaderboard(
    State(signing): State<Arc<SigningService>>,
    query: Result<Query<LeaderboardQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let Query(query) = query.map_err(|_| ApiError::invalid_input("Invalid leaderboard limit"))?;
    Ok(Json(signing.leaderboard(query.limit()).await?))
}
