//! Notification sinks for committed signatures.
//!
//! # Environment Variables
//! - `SIGNWALL_FEED_WEBHOOK`: Discord webhook URL for the signature feed
//! - `SIGNWALL_DISCORD_BOT_TOKEN`, `SIGNWALL_SIGNATURE_GUILD_ID`,
//!   `SIGNWALL_SIGNATURE_ROLE_ID`: grant a guild role to each signer
//!
//! A sink is enabled only when all of its variables are present.

use super::discord::DISCORD_API_BASE;
use super::{check_status, optional_env, transport_error, Notifier};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use signwall_core::{ProviderUser, SignatureReceipt, SignwallResult};

/// Guild role granted to signers.
#[derive(Debug, Clone)]
pub struct RoleGrantConfig {
    pub bot_token: SecretString,
    pub guild_id: String,
    pub role_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub feed_webhook: Option<SecretString>,
    pub role_grant: Option<RoleGrantConfig>,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        let feed_webhook = optional_env("SIGNWALL_FEED_WEBHOOK")
            .map(|url| SecretString::new(url.into_boxed_str()));

        let role_grant = match (
            optional_env("SIGNWALL_DISCORD_BOT_TOKEN"),
            optional_env("SIGNWALL_SIGNATURE_GUILD_ID"),
            optional_env("SIGNWALL_SIGNATURE_ROLE_ID"),
        ) {
            (Some(token), Some(guild_id), Some(role_id)) => Some(RoleGrantConfig {
                bot_token: SecretString::new(token.into_boxed_str()),
                guild_id,
                role_id,
                api_base: optional_env("SIGNWALL_DISCORD_API_BASE")
                    .unwrap_or_else(|| DISCORD_API_BASE.to_string()),
            }),
            _ => None,
        };

        Self {
            feed_webhook,
            role_grant,
        }
    }
}

/// Text posted to the feed for a new signature.
pub fn feed_message(user: &ProviderUser, position: i64) -> String {
    format!(
        ":pencil: **{}** signed the banner! (**#{}**)",
        user.display_name(),
        position
    )
}

// ============================================================================
// FEED WEBHOOK
// ============================================================================

pub struct FeedWebhookNotifier {
    webhook_url: SecretString,
    http: reqwest::Client,
}

impl FeedWebhookNotifier {
    pub fn new(webhook_url: SecretString, http: reqwest::Client) -> Self {
        Self { webhook_url, http }
    }
}

#[async_trait]
impl Notifier for FeedWebhookNotifier {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn signature_created(
        &self,
        user: &ProviderUser,
        receipt: &SignatureReceipt,
    ) -> SignwallResult<()> {
        let body = json!({
            "content": feed_message(user, receipt.position),
            "allowed_mentions": { "parse": [] },
        });
        let response = self
            .http
            .post(self.webhook_url.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("feed-webhook", e))?;
        check_status("feed-webhook", response).await?;
        Ok(())
    }
}

// ============================================================================
// ROLE GRANT
// ============================================================================

pub struct RoleGrantNotifier {
    config: RoleGrantConfig,
    http: reqwest::Client,
}

impl RoleGrantNotifier {
    pub fn new(config: RoleGrantConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn url(&self, user_id: &str) -> String {
        format!(
            "{}/guilds/{}/members/{}/roles/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.guild_id,
            user_id,
            self.config.role_id
        )
    }
}

#[async_trait]
impl Notifier for RoleGrantNotifier {
    fn name(&self) -> &'static str {
        "role"
    }

    async fn signature_created(
        &self,
        user: &ProviderUser,
        _receipt: &SignatureReceipt,
    ) -> SignwallResult<()> {
        let response = self
            .http
            .put(self.url(&user.id))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.config.bot_token.expose_secret()),
            )
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| transport_error("discord-roles", e))?;
        check_status("discord-roles", response).await?;
        Ok(())
    }
}
