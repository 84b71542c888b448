//! Public counters.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::services::SigningService;

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub signatures: i64,
}

/// GET /stats
pub async fn stats(State(signing): State<Arc<SigningService>>) -> ApiResult<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        signatures: signing.signature_count().await?,
    }))
}
