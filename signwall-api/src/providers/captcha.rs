//! CAPTCHA verification (Friendly Captcha siteverify protocol).

use super::{check_status, invalid_response, required_env, transport_error, CaptchaVerifier};
use crate::error::ApiResult;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use signwall_core::{CaptchaVerdict, SignwallResult};

const SERVICE: &str = "captcha";

#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub secret: SecretString,
    pub verify_url: String,
}

impl CaptchaConfig {
    /// Reads `SIGNWALL_CAPTCHA_SECRET` and `SIGNWALL_CAPTCHA_VERIFY_URL`.
    pub fn from_env() -> ApiResult<Self> {
        Ok(Self {
            secret: SecretString::new(required_env("SIGNWALL_CAPTCHA_SECRET")?.into_boxed_str()),
            verify_url: required_env("SIGNWALL_CAPTCHA_VERIFY_URL")?,
        })
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    solution: &'a str,
    secret: &'a str,
}

#[derive(Clone)]
pub struct FriendlyCaptchaVerifier {
    config: CaptchaConfig,
    http: reqwest::Client,
}

impl FriendlyCaptchaVerifier {
    pub fn new(config: CaptchaConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl CaptchaVerifier for FriendlyCaptchaVerifier {
    async fn verify(&self, solution: &str) -> SignwallResult<CaptchaVerdict> {
        let response = self
            .http
            .post(&self.config.verify_url)
            .json(&VerifyRequest {
                solution,
                secret: self.config.secret.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let verdict = response
            .json::<CaptchaVerdict>()
            .await
            .map_err(|e| invalid_response(SERVICE, e))?;
        if !verdict.success {
            tracing::info!(errors = ?verdict.errors, "Captcha rejected solution");
        }
        Ok(verdict)
    }
}

/// Accepts everything. Used outside production.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCaptcha;

#[async_trait]
impl CaptchaVerifier for DisabledCaptcha {
    async fn verify(&self, _solution: &str) -> SignwallResult<CaptchaVerdict> {
        Ok(CaptchaVerdict {
            success: true,
            errors: Vec::new(),
        })
    }
}
