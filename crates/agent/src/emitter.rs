//! Client-facing stream events.
//!
//! `StreamEvent` is the wire vocabulary a client sees over SSE. Every
//! [`EngineEvent`] maps to exactly one record; `checkpoint` and `end` frame
//! the turn. The [`EventEmitter`] encodes records to JSON and pushes them to
//! the outbound channel in order, and guarantees the stream ends with
//! exactly one `end`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::error;

use crate::event::EngineEvent;

/// The capability whose events get dedicated `search_*` records.
const SEARCH_CAPABILITY: &str = "web_search";

/// Last-resort frames, used when a record fails to encode.
const ENCODE_FAILURE_FRAME: &str = r#"{"type":"error","message":"failed to encode stream event"}"#;
const END_FRAME: &str = r#"{"type":"end"}"#;

/// Events sent to the client, one JSON object per SSE `data:` line.
///
/// - `checkpoint`: id of a newly started conversation (first, once)
/// - `content`: partial agent text
/// - `search_start`: a web search is running
/// - `search_results`: URLs the search returned (empty on failure)
/// - `capability_start`: any other capability is running
/// - `capability_end`: that capability finished
/// - `error`: the turn failed
/// - `end`: the stream is complete (last, once)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Checkpoint { checkpoint_id: String },

    Content { content: String },

    SearchStart { query: String },

    SearchResults { urls: Vec<String> },

    CapabilityStart {
        name: String,
        arguments: serde_json::Value,
    },

    CapabilityEnd { name: String, success: bool },

    Error { message: String },

    End,
}

impl StreamEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Checkpoint { .. } => "checkpoint",
            Self::Content { .. } => "content",
            Self::SearchStart { .. } => "search_start",
            Self::SearchResults { .. } => "search_results",
            Self::CapabilityStart { .. } => "capability_start",
            Self::CapabilityEnd { .. } => "capability_end",
            Self::Error { .. } => "error",
            Self::End => "end",
        }
    }
}

impl From<&EngineEvent> for StreamEvent {
    fn from(event: &EngineEvent) -> Self {
        match event {
            EngineEvent::ContentDelta { content } => Self::Content {
                content: content.clone(),
            },
            EngineEvent::CapabilityStarted {
                name, arguments, ..
            } if name == SEARCH_CAPABILITY => Self::SearchStart {
                query: search_query(arguments),
            },
            EngineEvent::CapabilityStarted {
                name, arguments, ..
            } => Self::CapabilityStart {
                name: name.clone(),
                arguments: arguments.clone(),
            },
            EngineEvent::CapabilityFinished { name, result, .. } if name == SEARCH_CAPABILITY => {
                let urls = if result.success {
                    result.data.as_ref().map(result_urls).unwrap_or_default()
                } else {
                    Vec::new()
                };
                Self::SearchResults { urls }
            }
            EngineEvent::CapabilityFinished { name, result, .. } => Self::CapabilityEnd {
                name: name.clone(),
                success: result.success,
            },
        }
    }
}

/// The query the model asked for. Arguments that never parsed as JSON
/// arrive as a raw string and are reported verbatim.
fn search_query(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other["query"].as_str().unwrap_or_default().to_string(),
    }
}

/// URLs of the result records, in result order. Records without a URL are skipped.
fn result_urls(data: &serde_json::Value) -> Vec<String> {
    data.as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|r| r["url"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Serialize a record into its wire form.
pub fn encode(event: &StreamEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Why an event could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("client disconnected")]
    Closed,

    #[error("stream already ended")]
    Ended,

    #[error("failed to encode {event_type} event: {source}")]
    Encode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes encoded events to a client stream, in order.
pub struct EventEmitter {
    tx: mpsc::Sender<String>,
    ended: bool,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx, ended: false }
    }

    /// Encode and send one event.
    ///
    /// An encoding failure ends the stream with an `error`/`end` pair.
    pub async fn emit(&mut self, event: StreamEvent) -> Result<(), EmitError> {
        if self.ended {
            return Err(EmitError::Ended);
        }

        let frame = match encode(&event) {
            Ok(frame) => frame,
            Err(source) => {
                let event_type = event.event_type();
                error!(event_type, error = %source, "Failed to encode stream event");
                self.ended = true;
                let _ = self.tx.send(ENCODE_FAILURE_FRAME.to_string()).await;
                let _ = self.tx.send(END_FRAME.to_string()).await;
                return Err(EmitError::Encode { event_type, source });
            }
        };

        if matches!(event, StreamEvent::End) {
            self.ended = true;
        }
        self.tx.send(frame).await.map_err(|_| EmitError::Closed)
    }

    /// Translate and send an engine event.
    pub async fn engine(&mut self, event: &EngineEvent) -> Result<(), EmitError> {
        self.emit(StreamEvent::from(event)).await
    }

    /// Announce a newly created conversation.
    pub async fn checkpoint(&mut self, checkpoint_id: &str) -> Result<(), EmitError> {
        self.emit(StreamEvent::Checkpoint {
            checkpoint_id: checkpoint_id.to_string(),
        })
        .await
    }

    /// Report a fatal failure.
    pub async fn error(&mut self, message: impl Into<String>) -> Result<(), EmitError> {
        self.emit(StreamEvent::Error {
            message: message.into(),
        })
        .await
    }

    /// Close the stream. Idempotent: only the first call sends `end`.
    pub async fn end(&mut self) {
        if !self.ended {
            let _ = self.emit(StreamEvent::End).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the client side of the stream has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
