//! Records persisted or exchanged by the service.

use crate::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// SESSION
// ============================================================================

/// Server-side session record. Only the handle ever reaches the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub refresh_token: String,
    pub access_token: String,
    pub user_id: UserId,
}

// ============================================================================
// USERS
// ============================================================================

/// Identity returned by the provider for an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default, rename = "avatar")]
    pub avatar_hash: Option<String>,
}

impl ProviderUser {
    /// `name#1234` for legacy accounts, plain `name` otherwise.
    pub fn display_name(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

/// Tokens issued by the provider on a code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// One row per signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: i64,
    pub user_id: UserId,
    pub referrer_id: Option<UserId>,
    pub created_at: Timestamp,
}

/// Insert payload. `referrer_id` has already been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSignature {
    pub user_id: UserId,
    pub referrer_id: Option<UserId>,
}

/// Result of a committed insert: the row and its queue position at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureReceipt {
    #[serde(flatten)]
    pub signature: Signature,
    pub position: i64,
}

/// Per-user view combining signature state and ranks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStanding {
    pub has_signed: bool,
    pub position: Option<i64>,
    pub referral_count: i64,
    pub referral_rank: Option<i64>,
    pub referred_by: Option<UserId>,
}

/// Row of the referral leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: UserId,
    pub username: Option<String>,
    pub referral_count: i64,
}

// ============================================================================
// ARTIFACTS
// ============================================================================

/// Rendered banner image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub generated_at: Timestamp,
}

impl Artifact {
    pub fn png(bytes: Vec<u8>, generated_at: Timestamp) -> Self {
        Self {
            bytes,
            content_type: "image/png".to_string(),
            generated_at,
        }
    }
}

/// Verdict from the CAPTCHA verification service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaptchaVerdict {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}
