//! Stale-while-revalidate cache for the rendered artifact.
//!
//! Two keys per artifact:
//!
//! - the fresh key, written with a short TTL, whose presence means "no need
//!   to regenerate";
//! - the stale key, written without expiry, which always holds the last
//!   artifact that was successfully produced.
//!
//! There is no atomicity across the two keys. A partially failed [`set`]
//! leaves either a fresh key without a matching stale key (served fresh until
//! the TTL elapses) or a stale key without a fresh one (served stale and
//! regenerated). Both are acceptable outcomes.
//!
//! [`set`]: ArtifactCache::set

use crate::codec;
use crate::kv::KeyValueStore;
use signwall_core::{Artifact, SignwallResult, ARTIFACT_FRESH_TTL};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the artifact cache.
#[derive(Debug, Clone)]
pub struct ArtifactCacheConfig {
    /// Key of the TTL-bounded copy. The stale copy lives at `<key>:stale`.
    pub key: String,
    /// Lifetime of the fresh copy.
    pub fresh_ttl: Duration,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            key: "banner".to_string(),
            fresh_ttl: ARTIFACT_FRESH_TTL,
        }
    }
}

impl ArtifactCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_fresh_ttl(mut self, ttl: Duration) -> Self {
        self.fresh_ttl = ttl;
        self
    }

    pub fn fresh_key(&self) -> &str {
        &self.key
    }

    pub fn stale_key(&self) -> String {
        format!("{}:stale", self.key)
    }
}

/// Which copy answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Fresh,
    Stale,
    Empty,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Empty => "miss",
        }
    }
}

/// Result of [`ArtifactCache::get`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub artifact: Option<Artifact>,
    pub source: CacheSource,
}

impl CacheLookup {
    pub fn fresh(artifact: Artifact) -> Self {
        Self {
            artifact: Some(artifact),
            source: CacheSource::Fresh,
        }
    }

    pub fn stale(artifact: Artifact) -> Self {
        Self {
            artifact: Some(artifact),
            source: CacheSource::Stale,
        }
    }

    pub fn empty() -> Self {
        Self {
            artifact: None,
            source: CacheSource::Empty,
        }
    }

    /// True unless the fresh copy answered.
    pub fn should_regenerate(&self) -> bool {
        self.source != CacheSource::Fresh
    }
}

pub struct ArtifactCache {
    store: Arc<dyn KeyValueStore>,
    config: ArtifactCacheConfig,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ArtifactCacheConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, ArtifactCacheConfig::default())
    }

    pub fn config(&self) -> &ArtifactCacheConfig {
        &self.config
    }

    /// Write both copies. Both writes are attempted even if the first fails;
    /// the first failure is returned.
    pub async fn set(&self, artifact: &Artifact) -> SignwallResult<()> {
        let payload = codec::encode_artifact(artifact)?;
        let stale_key = self.config.stale_key();

        let stale = self.store.set_persistent(&stale_key, &payload).await;
        if let Err(e) = &stale {
            tracing::warn!(key = %stale_key, error = %e, "Failed to write stale artifact copy");
        }

        let fresh = self
            .store
            .set_with_ttl(self.config.fresh_key(), &payload, self.config.fresh_ttl)
            .await;
        if let Err(e) = &fresh {
            tracing::warn!(key = %self.config.fresh_key(), error = %e, "Failed to write fresh artifact copy");
        }

        stale.and(fresh)
    }

    /// Look up the artifact, preferring the fresh copy.
    ///
    /// A present but undecodable copy is reported as a decode error; the
    /// serving workflow treats that as a miss.
    pub async fn get(&self) -> SignwallResult<CacheLookup> {
        if let Some(payload) = self.store.get(self.config.fresh_key()).await? {
            return Ok(CacheLookup::fresh(codec::decode_artifact(&payload)?));
        }
        match self.store.get(&self.config.stale_key()).await? {
            Some(payload) => Ok(CacheLookup::stale(codec::decode_artifact(&payload)?)),
            None => Ok(CacheLookup::empty()),
        }
    }
}
