//! The turn engine: a Reasoning/Acting state machine over one conversation.

use sleuth_config::AppConfig;
use sleuth_core::error::{ProviderError, TurnError};
use sleuth_core::message::{Conversation, Message, MessageToolCall};
use sleuth_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use sleuth_core::tool::{ToolCall, ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::EngineEvent;

/// Reason recorded for requests a disconnected client never saw answered.
const CANCELLED_REASON: &str = "cancelled";

/// Reason recorded for requests found unanswered in loaded history.
const ORPHANED_REASON: &str = "Error: no result was recorded for this request";

/// Outcome of a completed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnSummary {
    /// Reasoning steps taken
    pub cycles: u32,
    /// Capability invocations made
    pub capability_calls: usize,
    /// Token usage reported by the last model response that carried it
    pub usage: Option<Usage>,
}

/// Drives one conversation turn to completion.
///
/// Immutable once built, so a single engine is shared by every request.
pub struct TurnEngine {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    max_cycles: u32,
    model_timeout: Duration,
}

impl TurnEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
            max_cycles: 8,
            model_timeout: Duration::from_secs(120),
        }
    }

    /// Build an engine with every setting taken from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        Self::new(provider, tools, model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_system_prompt(&config.agent.system_prompt)
            .with_max_cycles(config.agent.max_cycles)
            .with_model_timeout(Duration::from_secs(config.agent.model_timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the system prompt. Blank prompts are ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// Set the maximum number of Reasoning steps per turn (at least 1).
    pub fn with_max_cycles(mut self, max: u32) -> Self {
        self.max_cycles = max.max(1);
        self
    }

    /// Bound the model request and every wait for its next fragment.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one turn: append `user_message`, then reason and act until the
    /// model answers without requesting a capability.
    ///
    /// Every message the turn produces is appended to `conversation`, also on
    /// failure, so the caller can persist `conversation.appended_since(..)`
    /// unconditionally. The history never ends with an unanswered request.
    ///
    /// Dropping the receiving half of `events` cancels the turn.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        user_message: Message,
        events: &mpsc::Sender<EngineEvent>,
    ) -> Result<TurnSummary, TurnError> {
        let repaired = repair_dangling(conversation);
        if repaired > 0 {
            warn!(checkpoint_id = %conversation.id, repaired, "Answered orphaned capability requests");
        }
        conversation.push(user_message);

        info!(checkpoint_id = %conversation.id, model = %self.model, "Turn started");

        let definitions = self.tools.definitions();
        let mut summary = TurnSummary::default();

        loop {
            if events.is_closed() {
                info!(checkpoint_id = %conversation.id, "Turn cancelled before reasoning");
                return Err(TurnError::Cancelled);
            }

            if summary.cycles >= self.max_cycles {
                warn!(checkpoint_id = %conversation.id, limit = self.max_cycles, "Cycle limit reached");
                return Err(TurnError::CycleLimitExceeded {
                    limit: self.max_cycles,
                });
            }
            summary.cycles += 1;

            // ── Reasoning ──
            debug!(checkpoint_id = %conversation.id, cycle = summary.cycles, "Reasoning");
            let (content, requests) = self
                .reason(conversation, &definitions, events, &mut summary)
                .await
                .inspect_err(|e| {
                    if !matches!(e, TurnError::Cancelled) {
                        warn!(checkpoint_id = %conversation.id, cycle = summary.cycles, error = %e, "Model invocation failed");
                    }
                })?;

            if requests.is_empty() {
                conversation.push(Message::assistant(content));
                info!(
                    checkpoint_id = %conversation.id,
                    cycles = summary.cycles,
                    capability_calls = summary.capability_calls,
                    "Turn complete"
                );
                return Ok(summary);
            }

            conversation.push(Message::assistant_with_calls(content, requests.clone()));

            // ── Acting ──
            debug!(checkpoint_id = %conversation.id, cycle = summary.cycles, count = requests.len(), "Acting");
            self.act(conversation, &requests, events, &mut summary).await?;
        }
    }

    /// One model invocation. Returns the full text and the requests it made.
    async fn reason(
        &self,
        conversation: &Conversation,
        definitions: &[ToolDefinition],
        events: &mpsc::Sender<EngineEvent>,
        summary: &mut TurnSummary,
    ) -> Result<(String, Vec<MessageToolCall>), TurnError> {
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(conversation.messages.iter().cloned());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: definitions.to_vec(),
            stream: true,
        };

        let mut stream = tokio::select! {
            opened = tokio::time::timeout(self.model_timeout, self.provider.stream(request)) => {
                opened.map_err(|_| self.timed_out("waiting for the model to respond"))??
            }
            _ = events.closed() => return Err(TurnError::Cancelled),
        };

        let mut content = String::new();
        let mut requests: Vec<MessageToolCall> = Vec::new();

        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.model_timeout, stream.recv()) => {
                    next.map_err(|_| self.timed_out("waiting for the next fragment"))?
                }
                _ = events.closed() => return Err(TurnError::Cancelled),
            };

            // A stream that closes without a final chunk ends the output.
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            if let Some(text) = chunk.content
                && !text.is_empty()
            {
                content.push_str(&text);
                emit(events, EngineEvent::ContentDelta { content: text }).await?;
            }

            for tc in chunk.tool_calls {
                match requests.iter_mut().find(|r| !tc.id.is_empty() && r.id == tc.id) {
                    Some(existing) => *existing = tc,
                    None => requests.push(tc),
                }
            }

            if chunk.usage.is_some() {
                summary.usage = chunk.usage;
            }

            if chunk.done {
                break;
            }
        }

        for request in requests.iter_mut().filter(|r| r.id.is_empty()) {
            request.id = format!("call_{}", uuid::Uuid::new_v4().simple());
        }

        Ok((content, requests))
    }

    /// Answer every request of one batch, in order.
    async fn act(
        &self,
        conversation: &mut Conversation,
        requests: &[MessageToolCall],
        events: &mpsc::Sender<EngineEvent>,
        summary: &mut TurnSummary,
    ) -> Result<(), TurnError> {
        for (i, request) in requests.iter().enumerate() {
            let call = ToolCall::from(request);

            let started = EngineEvent::CapabilityStarted {
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            };
            if emit(events, started).await.is_err() {
                return Err(cancel_remaining(conversation, &requests[i..]));
            }

            debug!(checkpoint_id = %conversation.id, tool = %call.name, call_id = %call.id, "Invoking capability");
            let result = tokio::select! {
                result = self.tools.invoke(&call) => result,
                _ = events.closed() => return Err(cancel_remaining(conversation, &requests[i..])),
            };
            summary.capability_calls += 1;

            let finished = EngineEvent::CapabilityFinished {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: result.clone(),
            };
            let delivered = emit(events, finished).await;
            conversation.push(result_message(&result));

            if delivered.is_err() {
                return Err(cancel_remaining(conversation, &requests[i + 1..]));
            }
        }
        Ok(())
    }

    fn timed_out(&self, waiting_for: &str) -> ProviderError {
        ProviderError::Timeout(format!(
            "{waiting_for} ({}s)",
            self.model_timeout.as_secs()
        ))
    }
}

async fn emit(events: &mpsc::Sender<EngineEvent>, event: EngineEvent) -> Result<(), TurnError> {
    events.send(event).await.map_err(|_| TurnError::Cancelled)
}

fn result_message(result: &ToolResult) -> Message {
    if result.success {
        Message::tool_result(&result.call_id, &result.output)
    } else {
        Message::tool_failure(&result.call_id, &result.output)
    }
}

/// Answer the rest of an interrupted batch so the history stays well-formed.
fn cancel_remaining(conversation: &mut Conversation, remaining: &[MessageToolCall]) -> TurnError {
    for request in remaining {
        conversation.push(Message::tool_failure(&request.id, CANCELLED_REASON));
    }
    info!(checkpoint_id = %conversation.id, skipped = remaining.len(), "Turn cancelled during acting");
    TurnError::Cancelled
}

/// Append failure results for requests left unanswered in loaded history.
/// Returns how many were repaired.
pub fn repair_dangling(conversation: &mut Conversation) -> usize {
    let orphaned: Vec<String> = conversation
        .unanswered_requests()
        .into_iter()
        .map(|r| r.id.clone())
        .collect();
    for id in &orphaned {
        conversation.push(Message::tool_failure(id, ORPHANED_REASON));
    }
    orphaned.len()
}
