//! Identifier rules: session handles and provider user IDs.

use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider user IDs are 16 to 20 ASCII decimal digits.
static PROVIDER_ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[0-9]{16,20}$").ok());

/// Number of random bytes in a session handle.
const SESSION_ID_BYTES: usize = 16;

/// Opaque session handle. 128 bits from the thread-local CSPRNG, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh handle. Never derived from a counter or the clock.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a handle received from a client. Returns `None` for values that
    /// could never have been issued (empty, wrong length, non-hex).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == SESSION_ID_BYTES * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `candidate` has the shape of a provider user ID.
pub fn is_provider_id(candidate: &str) -> bool {
    PROVIDER_ID_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(candidate))
}

/// Outcome of the shape-level referrer checks. The existence check needs the
/// signature store and happens in the signing workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferrerCheck {
    /// No referrer was supplied.
    Absent,
    /// Not 16-20 digits.
    Malformed,
    /// The signer named themselves.
    SelfReferral,
    /// Passed the local checks; must still have signed.
    Candidate(String),
}

/// Apply the shape and self-referral rules to a client-supplied referrer.
pub fn check_referrer(signer: &str, referrer: Option<&str>) -> ReferrerCheck {
    let Some(raw) = referrer.map(str::trim).filter(|r| !r.is_empty()) else {
        return ReferrerCheck::Absent;
    };
    if !is_provider_id(raw) {
        return ReferrerCheck::Malformed;
    }
    if raw == signer {
        return ReferrerCheck::SelfReferral;
    }
    ReferrerCheck::Candidate(raw.to_string())
}
