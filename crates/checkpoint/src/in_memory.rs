//! In-memory checkpoint store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sleuth_core::checkpoint::{CheckpointId, CheckpointStore};
use sleuth_core::error::CheckpointError;
use sleuth_core::message::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A checkpoint store that keeps every history in a map.
/// Nothing survives a restart.
#[derive(Clone)]
pub struct InMemoryCheckpointStore {
    histories: Arc<RwLock<HashMap<CheckpointId, Vec<Message>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of checkpoints with at least one message.
    pub async fn len(&self) -> usize {
        self.histories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.histories.read().await.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &CheckpointId) -> Result<Vec<Message>, CheckpointError> {
        Ok(self
            .histories
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, id: &CheckpointId, messages: &[Message]) -> Result<(), CheckpointError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.histories
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}
