//! # Sleuth Core
//!
//! Domain types, traits, and error definitions for the Sleuth search agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the provider, tool, checkpoint, agent and gateway crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the language model, capabilities, the
//! checkpoint store) is a trait here. Implementations live in their own
//! crates, so the turn engine can be driven by scripted stubs in tests and
//! by real HTTP clients in production.

pub mod checkpoint;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{CheckpointId, CheckpointStore};
pub use error::{Error, Result};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
