use async_trait::async_trait;
use classifier_client::CredentialProvider;
use feedguard_core::{AnalysisResult, CoreError, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};


/// Key namespace of cached analyses.
pub const ANALYSIS_PREFIX: &str = "analysis_";

pub fn analysis_key(post_id: &str) -> String {
    format!("{}{}", ANALYSIS_PREFIX, post_id)
}

/// Post id → analysis cache consumed by the filter pipeline.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// A miss is `Ok(None)`.
    async fn get(&self, post_id: &str) -> Result<Option<AnalysisResult>, CoreError>;

    /// Upserts the analysis for `post_id`.
    async fn put(&self, post_id: &str, result: &AnalysisResult) -> Result<(), CoreError>;

    /// Removes every cached analysis and returns how many were removed.
    /// Other keys, such as stored credentials, are kept.
    async fn clear(&self) -> Result<u64, CoreError>;
}

/// Key-value store on a single SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl SqliteStore {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    /// Connects and creates the schema.
    pub async fn open(connection_string: String) -> Result<Self, CoreError> {
        let mut store = Self::new(connection_string);
        store.connect().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| StoreError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database,
        // so keep exactly one alive for the life of the pool.
        let pool_options = if self.connection_string.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        debug!("Connected to {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(self.pool()?)
        .await
        .map_err(|e| StoreError::MigrationFailed {
            migration: format!("create kv_store: {}", e),
        })?;
        Ok(())
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.pool()?)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, CoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .map_err(StoreError::from)?;
        Ok(value)
    }

    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key LIKE ? ESCAPE '\\'")
            .bind(like_prefix(prefix))
            .execute(self.pool()?)
            .await
            .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    pub async fn count_prefix(&self, prefix: &str) -> Result<u64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM kv_store WHERE key LIKE ? ESCAPE '\\'",
        )
        .bind(like_prefix(prefix))
        .fetch_one(self.pool()?)
        .await
        .map_err(StoreError::from)?;
        Ok(count.max(0) as u64)
    }

    /// Credential stored under `key` in this store.
    pub fn credential(&self, key: impl Into<String>) -> StoredCredential {
        StoredCredential {
            store: self.clone(),
            key: key.into(),
        }
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| CoreError::Store(StoreError::NotConnected))
    }
}

fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

#[async_trait]
impl AnalysisCache for SqliteStore {
    async fn get(&self, post_id: &str) -> Result<Option<AnalysisResult>, CoreError> {
        let key = analysis_key(post_id);
        let Some(raw) = self.get_setting(&key).await? else {
            return Ok(None);
        };

        let result: AnalysisResult = serde_json::from_str(&raw).map_err(|e| {
            warn!("Cached entry {} is not JSON: {}", key, e);
            StoreError::CorruptEntry { key: key.clone() }
        })?;

        // A stored null carries no analysis.
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    async fn put(&self, post_id: &str, result: &AnalysisResult) -> Result<(), CoreError> {
        let raw = serde_json::to_string(result)?;
        self.save_setting(&analysis_key(post_id), &raw).await
    }

    async fn clear(&self) -> Result<u64, CoreError> {
        let removed = self.delete_prefix(ANALYSIS_PREFIX).await?;
        info!("Cache (analysis results) has been reset, {} entries removed", removed);
        Ok(removed)
    }
}

/// A credential kept in a [`SqliteStore`] under a fixed key.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    store: SqliteStore,
    key: String,
}

#[async_trait]
impl CredentialProvider for StoredCredential {
    async fn load(&self) -> Result<Option<String>, CoreError> {
        self.store.get_setting(&self.key).await
    }

    async fn store(&self, value: &str) -> Result<(), CoreError> {
        self.store.save_setting(&self.key, value).await
    }
}
