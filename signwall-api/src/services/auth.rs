//! Session authentication.
//!
//! Login exchanges an OAuth2 code for tokens and stores them server-side.
//! Every authenticated request re-validates the stored access token with the
//! identity provider; a revoked token ends the session. A positive cache of
//! successful lookups can be enabled to cut provider traffic, at the cost of
//! noticing revocation up to one TTL late.

use dashmap::DashMap;
use signwall_core::{
    IdentityProvider, ProviderUser, Session, SessionId, SignwallError, SignwallResult,
    UpstreamError,
};
use signwall_storage::{SessionManager, SignatureStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ApiError, ApiResult};

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: SessionId,
    pub session: Session,
    pub user: ProviderUser,
}

impl RequestContext {
    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session_id: SessionId,
    pub user: ProviderUser,
}

struct CachedUser {
    user: ProviderUser,
    expires_at: Instant,
}

pub struct Authenticator {
    sessions: SessionManager,
    identity: Arc<dyn IdentityProvider>,
    signatures: Arc<dyn SignatureStore>,
    user_cache: DashMap<String, CachedUser>,
    user_cache_ttl: Duration,
}

impl Authenticator {
    pub fn new(
        sessions: SessionManager,
        identity: Arc<dyn IdentityProvider>,
        signatures: Arc<dyn SignatureStore>,
        user_cache_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            identity,
            signatures,
            user_cache: DashMap::new(),
            user_cache_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.sessions.ttl()
    }

    /// Exchange an authorization code, record the user, and open a session.
    ///
    /// # Errors
    /// - `Unauthorized` for an empty code
    /// - `InvalidInput` when the provider rejects the code
    pub async fn login(&self, code: &str) -> ApiResult<LoginOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::unauthorized("Missing authorization code"));
        }

        let grant = self.identity.exchange_code(code).await.map_err(|e| {
            tracing::info!(error = %e, "Failed to exchange authorization code");
            ApiError::invalid_input("Failed to exchange authorization code")
        })?;

        let user = self
            .identity
            .current_user(&grant.access_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch user after code exchange");
                ApiError::from(e)
            })?;

        self.signatures.upsert_user(&user).await?;

        let session = Session {
            refresh_token: grant.refresh_token,
            access_token: grant.access_token,
            user_id: user.id.clone(),
        };
        let session_id = self.sessions.create_session(&session).await?;
        self.remember(&session.access_token, &user);

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome { session_id, user })
    }

    /// Resolve a session handle to a live identity.
    ///
    /// A missing session, an undecodable session, or a token the provider
    /// answers with 401 all yield `Unauthorized`; the latter two also delete
    /// the session.
    pub async fn authenticate(&self, session_id: &SessionId) -> ApiResult<RequestContext> {
        let session = match self.sessions.get_session(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(ApiError::unauthorized("Session not found or expired")),
            Err(SignwallError::Codec(e)) => {
                tracing::warn!(error = %e, "Discarding undecodable session");
                self.discard(session_id).await;
                return Err(ApiError::unauthorized("Session is invalid"));
            }
            Err(e) => return Err(e.into()),
        };

        let user = match self.resolve_user(&session.access_token).await {
            Ok(user) => user,
            Err(SignwallError::Upstream(UpstreamError::Unauthorized { .. })) => {
                tracing::info!(user_id = %session.user_id, "Access token revoked, ending session");
                self.forget(&session.access_token);
                self.discard(session_id).await;
                return Err(ApiError::unauthorized("Authorization was revoked"));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(RequestContext {
            session_id: session_id.clone(),
            session,
            user,
        })
    }

    /// End a session. Idempotent.
    pub async fn logout(&self, context: &RequestContext) -> ApiResult<()> {
        self.forget(&context.session.access_token);
        self.sessions.delete_session(&context.session_id).await?;
        tracing::info!(user_id = %context.user_id(), "User logged out");
        Ok(())
    }

    async fn discard(&self, session_id: &SessionId) {
        if let Err(e) = self.sessions.delete_session(session_id).await {
            tracing::warn!(error = %e, "Failed to delete session");
        }
    }

    async fn resolve_user(&self, access_token: &str) -> SignwallResult<ProviderUser> {
        if let Some(user) = self.cached_user(access_token) {
            return Ok(user);
        }
        let user = self.identity.current_user(access_token).await?;
        self.remember(access_token, &user);
        Ok(user)
    }

    fn cached_user(&self, access_token: &str) -> Option<ProviderUser> {
        if self.user_cache_ttl.is_zero() {
            return None;
        }
        let now = Instant::now();
        let hit = self
            .user_cache
            .get(access_token)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.user.clone());
        if hit.is_none() {
            self.user_cache
                .remove_if(access_token, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    fn remember(&self, access_token: &str, user: &ProviderUser) {
        if self.user_cache_ttl.is_zero() {
            return;
        }
        if let Some(expires_at) = Instant::now().checked_add(self.user_cache_ttl) {
            self.user_cache.insert(
                access_token.to_string(),
                CachedUser {
                    user: user.clone(),
                    expires_at,
                },
            );
        }
    }

    fn forget(&self, access_token: &str) {
        self.user_cache.remove(access_token);
    }

    /// Number of cached identity lookups, expired or not.
    pub fn cached_users(&self) -> usize {
        self.user_cache.len()
    }

    /// Drop expired identity lookups. Returns how many went.
    pub fn sweep_user_cache(&self) -> usize {
        self.sweep_user_cache_at(Instant::now())
    }

    fn sweep_user_cache_at(&self, now: Instant) -> usize {
        let before = self.user_cache.len();
        self.user_cache.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.user_cache.len())
    }
}
