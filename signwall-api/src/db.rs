//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres and the
//! [`SignatureStore`] implementation backed by it. The tables are described
//! in `sql/schema.sql`.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use signwall_core::{
    LeaderboardEntry, NewSignature, ProviderUser, Signature, SignatureReceipt, SignwallError,
    SignwallResult, StoreError,
};
use signwall_storage::SignatureStore;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "signwall".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SIGNWALL_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SIGNWALL_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("SIGNWALL_DB_NAME").unwrap_or_else(|_| "signwall".to_string()),
            user: std::env::var("SIGNWALL_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("SIGNWALL_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("SIGNWALL_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("SIGNWALL_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        pool_cfg.timeouts.recycle = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::storage_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn query_error(operation: &str, err: tokio_postgres::Error) -> SignwallError {
    if let Some(db_error) = err.as_db_error() {
        if db_error.code() == &SqlState::UNIQUE_VIOLATION {
            return StoreError::UniqueViolation {
                constraint: db_error.constraint().unwrap_or("unknown").to_string(),
            }
            .into();
        }
    }
    tracing::error!(operation = %operation, "Database error: {:?}", err);
    StoreError::backend(operation, err).into()
}

fn pool_error(err: deadpool_postgres::PoolError) -> SignwallError {
    tracing::error!("Connection pool error: {:?}", err);
    StoreError::Unavailable {
        reason: err.to_string(),
    }
    .into()
}

// ============================================================================
// SQL
// ============================================================================

const UPSERT_USER: &str = "\
    INSERT INTO users (user_id, username, discriminator, avatar_hash) \
    VALUES ($1, $2, $3, $4) \
    ON CONFLICT (user_id) DO UPDATE SET \
        username = EXCLUDED.username, \
        discriminator = EXCLUDED.discriminator, \
        avatar_hash = EXCLUDED.avatar_hash, \
        updated_at = now()";

const INSERT_SIGNATURE: &str = "\
    INSERT INTO signatures (user_id, referrer_id) VALUES ($1, $2) \
    RETURNING id, user_id, referrer_id, created_at";

const SELECT_SIGNATURE: &str =
    "SELECT id, user_id, referrer_id, created_at FROM signatures WHERE user_id = $1";

const QUEUE_POSITION: &str = "\
    SELECT position FROM ( \
        SELECT user_id, ROW_NUMBER() OVER (ORDER BY created_at, id) AS position \
        FROM signatures \
    ) AS ranked \
    WHERE user_id = $1";

const REFERRAL_COUNT: &str = "SELECT COUNT(*) FROM signatures WHERE referrer_id = $1";

const REFERRAL_RANK: &str = "\
    SELECT rank FROM ( \
        SELECT referrer_id, RANK() OVER (ORDER BY COUNT(*) DESC) AS rank \
        FROM signatures \
        WHERE referrer_id IS NOT NULL \
        GROUP BY referrer_id \
    ) AS ranked \
    WHERE referrer_id = $1";

const LEADERBOARD: &str = "\
    SELECT r.referrer_id, r.referral_count, \
           RANK() OVER (ORDER BY r.referral_count DESC) AS rank, \
           u.username, u.discriminator \
    FROM ( \
        SELECT referrer_id, COUNT(*) AS referral_count \
        FROM signatures \
        WHERE referrer_id IS NOT NULL \
        GROUP BY referrer_id \
    ) AS r \
    LEFT JOIN users u ON u.user_id = r.referrer_id \
    ORDER BY rank, r.referrer_id \
    LIMIT $1";

fn signature_from_row(row: &Row) -> Signature {
    Signature {
        id: row.get("id"),
        user_id: row.get("user_id"),
        referrer_id: row.get("referrer_id"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client wrapping a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    pub async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    async fn conn(&self) -> SignwallResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create tables and indexes if missing. Every statement is idempotent.
    pub async fn apply_schema(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }
}

const SCHEMA: &str = include_str!("../sql/schema.sql");

#[async_trait]
impl SignatureStore for DbClient {
    async fn upsert_user(&self, user: &ProviderUser) -> SignwallResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            UPSERT_USER,
            &[&user.id, &user.username, &user.discriminator, &user.avatar_hash],
        )
        .await
        .map_err(|e| query_error("upsert_user", e))?;
        Ok(())
    }

    async fn insert_signature(&self, new: &NewSignature) -> SignwallResult<SignatureReceipt> {
        let mut conn = self.conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| query_error("begin", e))?;

        let row = tx
            .query_one(INSERT_SIGNATURE, &[&new.user_id, &new.referrer_id])
            .await
            .map_err(|e| query_error("insert_signature", e))?;
        let signature = signature_from_row(&row);

        let position: i64 = tx
            .query_one(QUEUE_POSITION, &[&new.user_id])
            .await
            .map_err(|e| query_error("queue_position", e))?
            .get(0);

        tx.commit().await.map_err(|e| query_error("commit", e))?;

        Ok(SignatureReceipt {
            signature,
            position,
        })
    }

    async fn delete_signature(&self, user_id: &str) -> SignwallResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute("DELETE FROM signatures WHERE user_id = $1", &[&user_id])
            .await
            .map_err(|e| query_error("delete_signature", e))?;
        Ok(removed > 0)
    }

    async fn find_signature(&self, user_id: &str) -> SignwallResult<Option<Signature>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(SELECT_SIGNATURE, &[&user_id])
            .await
            .map_err(|e| query_error("find_signature", e))?;
        Ok(row.as_ref().map(signature_from_row))
    }

    async fn queue_position(&self, user_id: &str) -> SignwallResult<Option<i64>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(QUEUE_POSITION, &[&user_id])
            .await
            .map_err(|e| query_error("queue_position", e))?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn referral_count(&self, user_id: &str) -> SignwallResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(REFERRAL_COUNT, &[&user_id])
            .await
            .map_err(|e| query_error("referral_count", e))?;
        Ok(row.get(0))
    }

    async fn referral_rank(&self, user_id: &str) -> SignwallResult<Option<i64>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(REFERRAL_RANK, &[&user_id])
            .await
            .map_err(|e| query_error("referral_rank", e))?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn leaderboard(&self, limit: usize) -> SignwallResult<Vec<LeaderboardEntry>> {
        let conn = self.conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(LEADERBOARD, &[&limit])
            .await
            .map_err(|e| query_error("leaderboard", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let user_id: String = row.get("referrer_id");
                let username = row.get::<_, Option<String>>("username").map(|username| {
                    ProviderUser {
                        id: user_id.clone(),
                        username,
                        discriminator: row
                            .get::<_, Option<String>>("discriminator")
                            .unwrap_or_default(),
                        avatar_hash: None,
                    }
                    .display_name()
                });
                LeaderboardEntry {
                    rank: row.get("rank"),
                    user_id,
                    username,
                    referral_count: row.get("referral_count"),
                }
            })
            .collect())
    }

    async fn signature_count(&self) -> SignwallResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM signatures", &[])
            .await
            .map_err(|e| query_error("signature_count", e))?;
        Ok(row.get(0))
    }

    async fn ping(&self) -> SignwallResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(|e| query_error("ping", e))?;
        Ok(())
    }
}
