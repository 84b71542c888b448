//! Key-value store seam.
//!
//! Values are opaque byte strings; serialization is owned by the callers
//! (session manager, artifact cache). Every operation touches a single key
//! and is atomic at that granularity only.

use async_trait::async_trait;
use signwall_core::SignwallResult;
use std::time::Duration;

/// Pluggable expiring key-value backend.
///
/// Implementations must be thread-safe. A key whose TTL elapsed reads as
/// absent, exactly like a key that was never written.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> SignwallResult<Option<Vec<u8>>>;

    /// Write a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> SignwallResult<()>;

    /// Write a value with no expiry, clearing any previous TTL.
    async fn set_persistent(&self, key: &str, value: &[u8]) -> SignwallResult<()>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> SignwallResult<()>;

    /// Round-trip check used by readiness checks.
    async fn ping(&self) -> SignwallResult<()> {
        Ok(())
    }
}
