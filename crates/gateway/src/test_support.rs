//! Stubs for driving the router without network access.

use async_trait::async_trait;
use sleuth_core::checkpoint::{CheckpointId, CheckpointStore};
use sleuth_core::error::{CheckpointError, ProviderError, ToolError};
use sleuth_core::message::{Message, MessageToolCall};
use sleuth_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use sleuth_core::tool::ToolRegistry;
use sleuth_tools::{SearchBackend, SearchRecord, WebSearchTool};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub enum Step {
    Chunks(Vec<StreamChunk>),
    Refuse(ProviderError),
}

impl Step {
    /// Stream `text` word by word, then finish.
    pub fn answer(text: &str) -> Self {
        let mut chunks: Vec<_> = text.split_inclusive(' ').map(StreamChunk::text).collect();
        chunks.push(StreamChunk::finish(vec![], None));
        Self::Chunks(chunks)
    }

    /// Ask for one web search.
    pub fn search(id: &str, query: &str) -> Self {
        let call = MessageToolCall {
            id: id.into(),
            name: "web_search".into(),
            arguments: serde_json::json!({ "query": query }),
        };
        Self::Chunks(vec![StreamChunk::finish(vec![call], None)])
    }
}

/// Plays back one step per model call and records every request.
pub struct ScriptedProvider {
    steps: Mutex<Vec<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(mut steps: Vec<Step>) -> Self {
        steps.reverse();
        Self {
            steps: Mutex::new(steps),
            requests: Mutex::new(Vec::new()),
        }
    }

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
        unimplemented!("the gateway only streams")
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop().expect("no more scripted steps");

        match step {
            Step::Refuse(e) => Err(e),
            Step::Chunks(chunks) => {
                let (tx, rx) = mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    tx.send(Ok(chunk)).await.unwrap();
                }
                Ok(rx)
            }
        }
    }
}

/// A registry holding only `web_search` over `backend`.
pub fn registry_with(backend: Arc<dyn SearchBackend>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool::new(backend, 3)));
    registry
}

/// A search backend that is always down.
pub struct BrokenBackend;

#[async_trait]
impl SearchBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    async fn search(&self, _query: &str, _num_results: u32) -> Result<Vec<SearchRecord>, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: "search backend unavailable".into(),
        })
    }
}

/// A search backend that never answers within a test's lifetime.
pub struct SlowBackend;

#[async_trait]
impl SearchBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, _query: &str, _num_results: u32) -> Result<Vec<SearchRecord>, ToolError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// A checkpoint store whose readiness probe always fails.
pub struct NotReadyStore;

#[async_trait]
impl CheckpointStore for NotReadyStore {
    fn name(&self) -> &str {
        "not-ready"
    }

    async fn load(&self, _id: &CheckpointId) -> Result<Vec<Message>, CheckpointError> {
        Ok(Vec::new())
    }

    async fn append(&self, _id: &CheckpointId, _messages: &[Message]) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CheckpointError> {
        Err(CheckpointError::NotReady("database is locked".into()))
    }
}
