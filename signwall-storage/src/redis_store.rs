//! Redis-backed key-value store.
//!
//! Uses a multiplexed [`ConnectionManager`], which reconnects on its own and
//! is cheap to clone per operation.

use crate::kv::KeyValueStore;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use signwall_core::{SignwallResult, StoreError};
use std::time::Duration;

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Duration,
    pub response_timeout: Duration,
    pub number_of_retries: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_secs(2),
            number_of_retries: 1,
        }
    }
}

impl RedisConfig {
    /// Load from `SIGNWALL_REDIS_*` variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("SIGNWALL_REDIS_URL").unwrap_or(defaults.url),
            connection_timeout: std::env::var("SIGNWALL_REDIS_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connection_timeout),
            response_timeout: std::env::var("SIGNWALL_REDIS_RESPONSE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_timeout),
            number_of_retries: std::env::var("SIGNWALL_REDIS_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.number_of_retries),
        }
    }
}

/// [`KeyValueStore`] over a Redis connection manager.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(config: &RedisConfig) -> SignwallResult<Self> {
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.number_of_retries)
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout);

        let client = Client::open(config.url.as_str()).map_err(|e| StoreError::Unavailable {
            reason: format!("invalid redis url: {e}"),
        })?;
        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: e.to_string(),
            })?;

        tracing::info!("Connected to redis");
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KeyValueStore for RedisKvStore {
    async fn get(&self, key: &str) -> SignwallResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| StoreError::backend("GET", e))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> SignwallResult<()> {
        let mut conn = self.conn.clone();
        // SET EX rejects zero; round sub-second TTLs up.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| StoreError::backend("SETEX", e))?;
        Ok(())
    }

    async fn set_persistent(&self, key: &str, value: &[u8]) -> SignwallResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| StoreError::backend("SET", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SignwallResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError::backend("DEL", e))?;
        Ok(())
    }

    async fn ping(&self) -> SignwallResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::backend("PING", e))?;
        Ok(())
    }
}
