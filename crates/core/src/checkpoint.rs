//! Checkpoint store trait: persisted conversation history.
//!
//! A checkpoint id binds a client's future requests to one conversation.
//! The store maps each id to its ordered message sequence; a new request
//! carrying an existing id resumes that history instead of starting over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CheckpointError;
use crate::message::Message;

/// Opaque, globally unique conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CheckpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The core CheckpointStore trait.
///
/// Implementations: SQLite (durable) and in-memory (tests, ephemeral runs).
/// `append` must be atomic per checkpoint: all given messages land, or none.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Load the ordered history for a checkpoint. Unknown ids yield an empty history.
    async fn load(&self, id: &CheckpointId) -> std::result::Result<Vec<Message>, CheckpointError>;

    /// Append messages to the end of a checkpoint's history.
    async fn append(
        &self,
        id: &CheckpointId,
        messages: &[Message],
    ) -> std::result::Result<(), CheckpointError>;

    /// Issue a fresh checkpoint id.
    fn new_id(&self) -> CheckpointId {
        CheckpointId::new()
    }

    /// Readiness probe; the gateway refuses requests while this fails.
    async fn health_check(&self) -> std::result::Result<(), CheckpointError> {
        Ok(())
    }
}
