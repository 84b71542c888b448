//! Shared application state for Axum routers.
//!
//! Built once at startup from [`AppDependencies`] and cloned into every
//! handler. Nothing in the API crate reaches for a global store or client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use signwall_core::{ArtifactRenderer, CaptchaVerifier, IdentityProvider, Notifier};
use signwall_storage::{ArtifactCache, KeyValueStore, SessionManager, SignatureStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ApiConfig;
use crate::middleware::RateLimitState;
use crate::services::{ArtifactService, Authenticator, NotificationDispatcher, SigningService};

/// The outbound seams the application is assembled from.
pub struct AppDependencies {
    pub kv: Arc<dyn KeyValueStore>,
    pub signatures: Arc<dyn SignatureStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub renderer: Arc<dyn ArtifactRenderer>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub notifiers: Vec<Arc<dyn Notifier>>,
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub auth: Arc<Authenticator>,
    pub signing: Arc<SigningService>,
    pub artifacts: Arc<ArtifactService>,
    /// Held directly for readiness checks.
    pub kv: Arc<dyn KeyValueStore>,
    pub signatures: Arc<dyn SignatureStore>,
    pub rate_limits: RateLimitState,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, deps: AppDependencies) -> Self {
        let auth = Authenticator::new(
            SessionManager::new(deps.kv.clone()),
            deps.identity,
            deps.signatures.clone(),
            config.user_cache_ttl,
        );

        let notifications = NotificationDispatcher::new(deps.notifiers);
        if notifications.is_empty() {
            tracing::info!("No notification sinks configured");
        } else {
            tracing::info!(sinks = ?notifications.sinks(), "Notification sinks configured");
        }
        let signing = SigningService::new(
            deps.signatures.clone(),
            deps.captcha,
            config.captcha_required(),
            notifications,
        );

        let artifacts = ArtifactService::new(
            Arc::new(ArtifactCache::with_defaults(deps.kv.clone())),
            deps.renderer,
            config.render_single_flight,
        );

        Self {
            rate_limits: RateLimitState::new(&config),
            config: Arc::new(config),
            auth: Arc::new(auth),
            signing: Arc::new(signing),
            artifacts: Arc::new(artifacts),
            kv: deps.kv,
            signatures: deps.signatures,
            start_time: Instant::now(),
        }
    }

    /// Periodically drop idle rate limiters and expired identity lookups.
    pub fn spawn_housekeeping(&self, every: Duration) -> JoinHandle<()> {
        let rate_limits = self.rate_limits.clone();
        let auth = self.auth.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let limiters = rate_limits.sweep_idle();
                let users = auth.sweep_user_cache();
                if limiters > 0 || users > 0 {
                    tracing::debug!(limiters, users, "Housekeeping sweep");
                }
            }
        })
    }
}

crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<Authenticator>, auth);
crate::impl_from_ref!(Arc<SigningService>, signing);
crate::impl_from_ref!(Arc<ArtifactService>, artifacts);
crate::impl_from_ref!(RateLimitState, rate_limits);
