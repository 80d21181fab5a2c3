//! Shared test helpers for engine tests.

use async_trait::async_trait;
use sleuth_core::error::{ProviderError, ToolError};
use sleuth_core::message::MessageToolCall;
use sleuth_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use sleuth_core::tool::{Tool, ToolResult};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted model invocation.
pub enum Step {
    /// Stream these chunks, then close.
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    /// Reject the request outright.
    Refuse(ProviderError),
    /// Accept the request, then never produce a fragment.
    Stall,
}

impl Step {
    /// Stream `text` in a few fragments and finish without requests.
    pub fn answer(text: &str) -> Self {
        let mut chunks: Vec<_> = text
            .split_inclusive(' ')
            .map(|piece| Ok(StreamChunk::text(piece)))
            .collect();
        chunks.push(Ok(StreamChunk::finish(vec![], None)));
        Self::Chunks(chunks)
    }

    /// Finish with capability requests and no text.
    pub fn request(calls: Vec<MessageToolCall>) -> Self {
        Self::Chunks(vec![Ok(StreamChunk::finish(calls, None))])
    }
}

/// A streaming provider that plays back scripted steps, one per call.
///
/// Panics if more calls are made than steps provided.
pub struct ScriptedProvider {
    steps: Mutex<Vec<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
    stalled: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(mut steps: Vec<Step>) -> Self {
        steps.reverse();
        Self {
            steps: Mutex::new(steps),
            requests: Mutex::new(Vec::new()),
            stalled: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        unimplemented!("the engine only streams")
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedProvider: no more steps");

        match step {
            Step::Refuse(e) => Err(e),
            Step::Stall => {
                let (tx, rx) = mpsc::channel(1);
                self.stalled.lock().unwrap().push(tx);
                Ok(rx)
            }
            Step::Chunks(chunks) => {
                let (tx, rx) = mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    tx.send(chunk).await.unwrap();
                }
                Ok(rx)
            }
        }
    }
}

pub fn search_call(id: &str, query: &str) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: "web_search".into(),
        arguments: serde_json::json!({ "query": query }),
    }
}

/// A `web_search` stand-in returning two fixed records.
pub struct FakeSearch;

#[async_trait]
impl Tool for FakeSearch {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]})
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let data = serde_json::json!([
            {"title": format!("{query} 1"), "url": "https://one.example/", "snippet": "Sunny, 21C"},
            {"title": format!("{query} 2"), "url": "https://two.example/", "snippet": "Rain tomorrow"}
        ]);
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        })
    }
}

/// A `web_search` that always fails.
pub struct BrokenSearch;

#[async_trait]
impl Tool for BrokenSearch {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: "search backend unavailable".into(),
        })
    }
}

/// A `web_search` that takes an hour.
pub struct SlowSearch;

#[async_trait]
impl Tool for SlowSearch {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web, slowly"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolResult::failure("", "unreachable"))
    }
}
