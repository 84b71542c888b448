//! Signwall API Server Entry Point
//!
//! Reads configuration, connects Redis and PostgreSQL, wires the outbound
//! providers, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signwall_api::providers::{
    http_client, CaptchaConfig, DisabledCaptcha, DiscordConfig, DiscordIdentityProvider,
    FeedWebhookNotifier, FriendlyCaptchaVerifier, HttpRenderer, NotifyConfig, RendererConfig,
    RoleGrantNotifier,
};
use signwall_api::telemetry::{init_tracing, TelemetryConfig};
use signwall_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppDependencies, AppState, DbClient,
    DbConfig,
};
use signwall_core::{CaptchaVerifier, Notifier};
use signwall_storage::{RedisConfig, RedisKvStore};

/// How often idle rate limiters and expired identity lookups are dropped.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let config = ApiConfig::from_env();
    if config.is_production() {
        validate_api_config_for_production(&config)?;
    }
    let addr: SocketAddr = config.bind_addr().parse().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", config.bind_addr(), e))
    })?;

    let http = http_client(config.upstream_timeout)?;

    let kv = Arc::new(RedisKvStore::connect(&RedisConfig::from_env()).await?);

    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.apply_schema().await?;

    let captcha: Arc<dyn CaptchaVerifier> = if config.captcha_required() {
        Arc::new(FriendlyCaptchaVerifier::new(
            CaptchaConfig::from_env()?,
            http.clone(),
        ))
    } else {
        tracing::info!("CAPTCHA verification disabled outside production");
        Arc::new(DisabledCaptcha)
    };

    let deps = AppDependencies {
        kv,
        signatures: Arc::new(db),
        identity: Arc::new(DiscordIdentityProvider::new(
            DiscordConfig::from_env()?,
            http.clone(),
        )),
        renderer: Arc::new(HttpRenderer::new(RendererConfig::from_env()?, http.clone())),
        captcha,
        notifiers: build_notifiers(NotifyConfig::from_env(), &http),
    };

    let state = AppState::new(config, deps);
    let housekeeping = state.spawn_housekeeping(HOUSEKEEPING_INTERVAL);
    let app = create_api_router(state);

    tracing::info!(%addr, "Starting signwall API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    housekeeping.abort();
    tracing::info!("Server stopped");
    Ok(())
}

/// Refuse to start in production with an open CORS policy.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set SIGNWALL_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. Set SIGNWALL_RATE_LIMIT_ENABLED=true."
        );
    }
    if !config.cookie_secure {
        tracing::warn!("Session cookies are issued without the Secure attribute");
    }
    Ok(())
}

fn build_notifiers(config: NotifyConfig, http: &reqwest::Client) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    if let Some(webhook) = config.feed_webhook {
        notifiers.push(Arc::new(FeedWebhookNotifier::new(webhook, http.clone())));
    }
    if let Some(role_grant) = config.role_grant {
        notifiers.push(Arc::new(RoleGrantNotifier::new(role_grant, http.clone())));
    }
    notifiers
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
