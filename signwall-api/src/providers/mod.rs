//! Production implementations of the outbound service traits.
//!
//! They share one `reqwest::Client` configured with the upstream timeout;
//! calls are never retried automatically.

pub mod captcha;
pub mod discord;
pub mod notify;
pub mod renderer;

use signwall_core::{ConfigError, UpstreamError};
use std::time::Duration;

pub use signwall_core::{ArtifactRenderer, CaptchaVerifier, IdentityProvider, Notifier};

pub use captcha::{CaptchaConfig, DisabledCaptcha, FriendlyCaptchaVerifier};
pub use discord::{DiscordConfig, DiscordIdentityProvider};
pub use notify::{FeedWebhookNotifier, NotifyConfig, RoleGrantConfig, RoleGrantNotifier};
pub use renderer::{HttpRenderer, RendererConfig};

// ============================================================================
// SHARED HTTP PLUMBING
// ============================================================================

/// Build the shared outbound client.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("signwall/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamError::Transport {
            service: "http-client".to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout {
            service: service.to_string(),
        }
    } else {
        UpstreamError::Transport {
            service: service.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Longest upstream error body echoed into logs.
const MAX_ERROR_BODY: usize = 256;

/// Turn non-2xx responses into [`UpstreamError`]; 401 becomes `Unauthorized`.
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized {
            service: service.to_string(),
        });
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Err(UpstreamError::Status {
        service: service.to_string(),
        status: status.as_u16(),
        message,
    })
}

pub(crate) fn invalid_response(service: &str, err: impl ToString) -> UpstreamError {
    UpstreamError::InvalidResponse {
        service: service.to_string(),
        reason: err.to_string(),
    }
}

/// Read a required, non-empty environment variable.
pub(crate) fn required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            field: key.to_string(),
        })
}

/// Read an optional environment variable, treating empty as unset.
pub(crate) fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
