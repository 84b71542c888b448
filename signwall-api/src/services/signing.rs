//! Signing workflow.
//!
//! `authenticated -> validated -> persisted -> notified`. Authentication is
//! done by the session middleware before a request gets here. The unique
//! constraint on the signature store is the only duplicate guard; nothing
//! checks "already signed?" up front.

use serde::Deserialize;
use signwall_core::{
    check_referrer, CaptchaVerifier, LeaderboardEntry, NewSignature, ReferrerCheck,
    SignatureReceipt, SignatureStanding, SignwallError, StoreError, UserId,
};
use signwall_storage::SignatureStore;
use std::sync::Arc;

use super::{NotificationDispatcher, RequestContext};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::telemetry::metrics;

/// Body of `POST /banner/sign`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub captcha_solution: Option<String>,
}

pub struct SigningService {
    signatures: Arc<dyn SignatureStore>,
    captcha: Arc<dyn CaptchaVerifier>,
    captcha_required: bool,
    notifications: NotificationDispatcher,
}

fn record(outcome: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_signature(outcome);
    }
}

impl SigningService {
    pub fn new(
        signatures: Arc<dyn SignatureStore>,
        captcha: Arc<dyn CaptchaVerifier>,
        captcha_required: bool,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            signatures,
            captcha,
            captcha_required,
            notifications,
        }
    }

    /// Sign the banner as the caller.
    ///
    /// Returns the committed signature with its queue position. Notifications
    /// are dispatched in the background after the commit.
    ///
    /// # Errors
    /// - `MissingField` / `CaptchaFailed` when the CAPTCHA check fails
    /// - `AlreadySigned` when the caller has a signature
    pub async fn sign(
        &self,
        context: &RequestContext,
        request: SignRequest,
    ) -> ApiResult<SignatureReceipt> {
        let user_id = context.user_id();

        if self.captcha_required {
            self.check_captcha(request.captcha_solution.as_deref()).await?;
        }

        let referrer_id = self.resolve_referrer(user_id, request.referrer.as_deref()).await;

        let new = NewSignature {
            user_id: user_id.to_string(),
            referrer_id,
        };
        let receipt = match self.signatures.insert_signature(&new).await {
            Ok(receipt) => receipt,
            Err(SignwallError::Store(StoreError::UniqueViolation { .. })) => {
                record("already_signed");
                return Err(ApiError::already_signed());
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to create signature");
                record("error");
                return Err(e.into());
            }
        };

        record("signed");
        tracing::info!(
            user_id = %user_id,
            position = receipt.position,
            referrer_id = ?receipt.signature.referrer_id,
            "Banner signed"
        );

        self.notifications
            .dispatch(context.user.clone(), receipt.clone());
        Ok(receipt)
    }

    async fn check_captcha(&self, solution: Option<&str>) -> ApiResult<()> {
        let Some(solution) = solution.map(str::trim).filter(|s| !s.is_empty()) else {
            record("captcha_missing");
            return Err(ApiError::new(
                ErrorCode::MissingField,
                "Failed to read capcha solution from payload",
            ));
        };

        match self.captcha.verify(solution).await {
            Ok(verdict) if verdict.success => Ok(()),
            Ok(verdict) => {
                tracing::debug!(errors = ?verdict.errors, "Captcha solution rejected");
                record("captcha_failed");
                Err(ApiError::captcha_failed()
                    .with_details(serde_json::json!({ "errors": verdict.errors })))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Captcha verification request failed");
                record("captcha_failed");
                Err(ApiError::captcha_failed())
            }
        }
    }

    /// Keep the referrer only if it is well formed, not the signer, and has
    /// signed. Anything else, including a store failure, drops it.
    async fn resolve_referrer(&self, signer: &str, referrer: Option<&str>) -> Option<UserId> {
        let candidate = match check_referrer(signer, referrer) {
            ReferrerCheck::Absent => return None,
            ReferrerCheck::Malformed => {
                tracing::debug!(user_id = %signer, "Ignoring malformed referrer");
                return None;
            }
            ReferrerCheck::SelfReferral => {
                tracing::debug!(user_id = %signer, "Ignoring self referral");
                return None;
            }
            ReferrerCheck::Candidate(candidate) => candidate,
        };

        match self.signatures.has_signed(&candidate).await {
            Ok(true) => Some(candidate),
            Ok(false) => {
                tracing::debug!(user_id = %signer, referrer_id = %candidate, "Ignoring referrer without a signature");
                None
            }
            Err(e) => {
                tracing::warn!(referrer_id = %candidate, error = %e, "Referrer lookup failed, dropping referrer");
                None
            }
        }
    }

    /// Remove the caller's signature. Returns whether a row was deleted.
    pub async fn unsign(&self, user_id: &str) -> ApiResult<bool> {
        let removed = self.signatures.delete_signature(user_id).await?;
        if removed {
            tracing::info!(user_id = %user_id, "Banner unsigned");
        }
        Ok(removed)
    }

    pub async fn standing(&self, user_id: &str) -> ApiResult<SignatureStanding> {
        Ok(self.signatures.standing(user_id).await?)
    }

    pub async fn leaderboard(&self, limit: usize) -> ApiResult<Vec<LeaderboardEntry>> {
        Ok(self.signatures.leaderboard(limit).await?)
    }

    pub async fn signature_count(&self) -> ApiResult<i64> {
        Ok(self.signatures.signature_count().await?)
    }
}
