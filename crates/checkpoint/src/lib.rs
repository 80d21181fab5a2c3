//! Checkpoint stores for Sleuth.
//!
//! A checkpoint store persists each conversation's message history under its
//! checkpoint id. Two backends ship here: SQLite for durable storage and an
//! in-memory map for tests and throwaway runs. [`CheckpointLocks`]
//! serializes turns that target the same checkpoint.

pub mod in_memory;
pub mod lock;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryCheckpointStore;
pub use lock::{CheckpointGuard, CheckpointLocks};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use sleuth_config::CheckpointConfig;
use sleuth_core::CheckpointStore;
use sleuth_core::error::CheckpointError;
use std::sync::Arc;

/// Build the configured checkpoint store.
pub async fn build_from_config(
    config: &CheckpointConfig,
) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryCheckpointStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteCheckpointStore::open(&config.path).await?)),
        other => Err(CheckpointError::NotReady(format!(
            "unsupported checkpoint backend '{other}'"
        ))),
    }
}
