//! Engine events: progress notifications raised during a turn.

use sleuth_core::tool::ToolResult;

/// Emitted by the [`TurnEngine`](crate::TurnEngine) while a turn runs.
/// Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A fragment of the agent's answer, in arrival order.
    ContentDelta { content: String },

    /// A capability invocation is about to run.
    CapabilityStarted {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A capability invocation finished, successfully or not.
    CapabilityFinished {
        call_id: String,
        name: String,
        result: ToolResult,
    },
}
