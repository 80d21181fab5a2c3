//! SQLite checkpoint store.
//!
//! Uses a single SQLite database file with two tables:
//! - `checkpoints`: one row per conversation, with creation/update times
//! - `checkpoint_messages`: the ordered history, one JSON-encoded message per row
//!
//! Rows are ordered by `(checkpoint_id, seq)`; `seq` is dense from zero.

use async_trait::async_trait;
use chrono::Utc;
use sleuth_core::checkpoint::{CheckpointId, CheckpointStore};
use sleuth_core::error::CheckpointError;
use sleuth_core::message::Message;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A durable checkpoint store backed by SQLite.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed.
    pub async fn open(path: &Path) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CheckpointError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite checkpoint store initialized at {}", path.display());
        Ok(store)
    }

    /// An ephemeral in-process database.
    ///
    /// Every pooled connection to `:memory:` would see its own empty
    /// database, so the pool is pinned to a single connection.
    pub async fn in_memory() -> Result<Self, CheckpointError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CheckpointError::Storage(format!("Invalid SQLite path: {e}")))?
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations: creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id          TEXT PRIMARY KEY NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("checkpoints table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoint_messages (
                checkpoint_id  TEXT NOT NULL REFERENCES checkpoints(id) ON DELETE CASCADE,
                seq            INTEGER NOT NULL,
                message        TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                PRIMARY KEY (checkpoint_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("checkpoint_messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_updated_at ON checkpoints(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("updated_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Most recently updated checkpoint ids, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<CheckpointId>, CheckpointError> {
        let rows = sqlx::query("SELECT id FROM checkpoints ORDER BY updated_at DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointError::QueryFailed(format!("recent: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map(CheckpointId::from)
                    .map_err(|e| CheckpointError::QueryFailed(format!("id column: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &CheckpointId) -> Result<Vec<Message>, CheckpointError> {
        let rows = sqlx::query(
            "SELECT seq, message FROM checkpoint_messages WHERE checkpoint_id = ?1 ORDER BY seq",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CheckpointError::QueryFailed(format!("load {id}: {e}")))?;

        rows.iter()
            .map(|row| {
                let seq: i64 = row
                    .try_get("seq")
                    .map_err(|e| CheckpointError::QueryFailed(format!("seq column: {e}")))?;
                let raw: String = row
                    .try_get("message")
                    .map_err(|e| CheckpointError::QueryFailed(format!("message column: {e}")))?;
                serde_json::from_str(&raw).map_err(|e| CheckpointError::Corrupt {
                    checkpoint_id: id.to_string(),
                    reason: format!("message {seq}: {e}"),
                })
            })
            .collect()
    }

    async fn append(&self, id: &CheckpointId, messages: &[Message]) -> Result<(), CheckpointError> {
        if messages.is_empty() {
            return Ok(());
        }

        let encoded = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CheckpointError::Storage(format!("Message serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (id, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointError::Storage(format!("checkpoint upsert failed: {e}")))?;

        let next_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq) + 1, 0) AS next FROM checkpoint_messages WHERE checkpoint_id = ?1",
        )
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("next"))
        .map_err(|e| CheckpointError::QueryFailed(format!("next seq: {e}")))?;

        for (offset, message) in encoded.iter().enumerate() {
            sqlx::query(
                "INSERT INTO checkpoint_messages (checkpoint_id, seq, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id.as_str())
            .bind(next_seq + offset as i64)
            .bind(message)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| CheckpointError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(checkpoint_id = %id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CheckpointError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| CheckpointError::NotReady(e.to_string()))
    }
}
