//! Outbound service seams.
//!
//! Every external dependency of the signing and serving workflows sits
//! behind one of these traits. Production implementations live in
//! signwall-api; fakes live in signwall-test-utils.

use crate::{Artifact, CaptchaVerdict, ProviderUser, SignatureReceipt, SignwallResult, TokenGrant};
use async_trait::async_trait;

/// OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trade an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> SignwallResult<TokenGrant>;

    /// Resolve the user behind an access token. A revoked token fails with
    /// [`crate::UpstreamError::Unauthorized`].
    async fn current_user(&self, access_token: &str) -> SignwallResult<ProviderUser>;
}

/// Produces the banner image. Slow; results are cached.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self) -> SignwallResult<Artifact>;
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, solution: &str) -> SignwallResult<CaptchaVerdict>;
}

/// Best-effort sink told about each committed signature.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn signature_created(
        &self,
        user: &ProviderUser,
        receipt: &SignatureReceipt,
    ) -> SignwallResult<()>;
}
