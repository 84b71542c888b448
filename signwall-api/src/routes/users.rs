//! The caller's profile and signing standing.

use axum::{extract::State, Json};
use serde::Serialize;
use signwall_core::{ProviderUser, SignatureStanding};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::middleware::Authenticated;
use crate::services::SigningService;

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUserResponse {
    pub user: ProviderUser,
    pub signature: SignatureStanding,
}

/// GET /users/@me
pub async fn current_user(
    State(signing): State<Arc<SigningService>>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<Json<CurrentUserResponse>> {
    let signature = signing.standing(ctx.user_id()).await?;
    Ok(Json(CurrentUserResponse {
        user: ctx.user,
        signature,
    }))
}
