//! Signwall Core - Entity Types
//!
//! Plain data structures shared by the storage and API crates, plus the
//! identifier rules, the error taxonomy, and the traits for outbound
//! services. No I/O lives here.

use chrono::{DateTime, Utc};
use std::time::Duration;

mod entities;
mod error;
mod identity;
mod providers;

pub use entities::*;
pub use error::*;
pub use identity::*;
pub use providers::*;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Provider-issued user identifier (a Discord snowflake rendered as text).
pub type UserId = String;

/// Lifetime of a session record, measured from creation.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of the fresh artifact key.
pub const ARTIFACT_FRESH_TTL: Duration = Duration::from_secs(30);

/// Name of the cookie carrying the session handle.
pub const SESSION_COOKIE_NAME: &str = "session_id";
