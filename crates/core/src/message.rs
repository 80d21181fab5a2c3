//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! the gateway appends a user message, the turn engine appends agent and
//! capability-result messages, the checkpoint store persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::checkpoint::CheckpointId;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The agent (model output)
    Assistant,
    /// System instructions; sent to the model, never persisted
    System,
    /// Capability result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (may be empty on agent messages that only request capabilities)
    pub content: String,

    /// Capability requests made by the agent (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a capability result, which request it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Set on capability results that carry a failure instead of a payload
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new agent message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an agent message that defers to one or more capabilities.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a successful capability result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Create a failed capability result message.
    pub fn tool_failure(tool_call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut msg = Self::tool_result(tool_call_id, reason);
        msg.is_error = true;
        msg
    }
}

/// A capability request embedded in an agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Correlation ID for this request
    pub id: String,

    /// Name of the capability to invoke
    pub name: String,

    /// Structured arguments as produced by the model
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A conversation: the ordered, append-only message history behind a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Checkpoint ID the conversation is persisted under
    pub id: CheckpointId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation object was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation with a fresh checkpoint ID.
    pub fn new() -> Self {
        Self::resume(CheckpointId::new(), Vec::new())
    }

    /// Rebuild a conversation from persisted history.
    pub fn resume(id: CheckpointId, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Capability requests that have no result later in the history, in request order.
    pub fn unanswered_requests(&self) -> Vec<&MessageToolCall> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .filter(|tc| !answered.contains(tc.id.as_str()))
            .collect()
    }

    /// Messages appended after the first `from` entries.
    pub fn appended_since(&self, from: usize) -> &[Message] {
        self.messages.get(from..).unwrap_or(&[])
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
