//! Discord OAuth2 identity provider.
//!
//! # Environment Variables
//! - `SIGNWALL_DISCORD_CLIENT_ID`: Required - OAuth2 application client ID
//! - `SIGNWALL_DISCORD_CLIENT_SECRET`: Required - OAuth2 client secret
//! - `SIGNWALL_DISCORD_REDIRECT_URI`: Required - Redirect URI registered with Discord
//! - `SIGNWALL_DISCORD_API_BASE`: Optional - defaults to `https://discord.com/api/v10`

use super::{check_status, invalid_response, required_env as required, transport_error, IdentityProvider};
use crate::error::ApiResult;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use signwall_core::{ProviderUser, SignwallResult, TokenGrant};

const SERVICE: &str = "discord";

/// Default REST API base.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord OAuth2 application configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub api_base: String,
}

impl DiscordConfig {
    /// Load the configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error if a required variable is not set.
    pub fn from_env() -> ApiResult<Self> {
        Ok(Self {
            client_id: required("SIGNWALL_DISCORD_CLIENT_ID")?,
            client_secret: SecretString::new(
                required("SIGNWALL_DISCORD_CLIENT_SECRET")?.into_boxed_str(),
            ),
            redirect_uri: required("SIGNWALL_DISCORD_REDIRECT_URI")?,
            api_base: std::env::var("SIGNWALL_DISCORD_API_BASE")
                .unwrap_or_else(|_| DISCORD_API_BASE.to_string()),
        })
    }

    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let client_secret: String = client_secret.into();
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into_boxed_str()),
            redirect_uri: redirect_uri.into(),
            api_base: DISCORD_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }
}

/// [`IdentityProvider`] backed by Discord's REST API.
#[derive(Clone)]
pub struct DiscordIdentityProvider {
    config: DiscordConfig,
    http: reqwest::Client,
}

impl DiscordIdentityProvider {
    pub fn new(config: DiscordConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl IdentityProvider for DiscordIdentityProvider {
    async fn exchange_code(&self, code: &str) -> SignwallResult<TokenGrant> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", "identify"),
        ];

        let response = self
            .http
            .post(self.config.url("/oauth2/token"))
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let grant = response
            .json::<TokenGrant>()
            .await
            .map_err(|e| invalid_response(SERVICE, e))?;
        Ok(grant)
    }

    async fn current_user(&self, access_token: &str) -> SignwallResult<ProviderUser> {
        let response = self
            .http
            .get(self.config.url("/users/@me"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let user = response
            .json::<ProviderUser>()
            .await
            .map_err(|e| invalid_response(SERVICE, e))?;
        Ok(user)
    }
}
