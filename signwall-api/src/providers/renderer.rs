//! Banner renderer client.
//!
//! The renderer is an opaque RPC: an empty JSON request in, the encoded
//! image back as the response body.

use super::{check_status, invalid_response, required_env, transport_error, ArtifactRenderer};
use crate::error::ApiResult;
use async_trait::async_trait;
use chrono::Utc;
use signwall_core::{Artifact, SignwallResult};

const SERVICE: &str = "renderer";

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Endpoint that returns a freshly rendered banner.
    pub url: String,
}

impl RendererConfig {
    /// Reads `SIGNWALL_RENDERER_URL`.
    pub fn from_env() -> ApiResult<Self> {
        Ok(Self {
            url: required_env("SIGNWALL_RENDERER_URL")?,
        })
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Clone)]
pub struct HttpRenderer {
    config: RendererConfig,
    http: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(config: RendererConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl ArtifactRenderer for HttpRenderer {
    async fn render(&self) -> SignwallResult<Artifact> {
        let response = self
            .http
            .post(&self.config.url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/png")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if bytes.is_empty() {
            return Err(invalid_response(SERVICE, "empty image").into());
        }

        Ok(Artifact {
            bytes: bytes.to_vec(),
            content_type,
            generated_at: Utc::now(),
        })
    }
}
