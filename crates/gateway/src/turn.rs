//! One request, one turn.
//!
//! [`drive_turn`] owns a turn from lock acquisition to the final `end`
//! frame: it loads or creates the checkpoint, runs the engine while relaying
//! its events to the client, and persists whatever the turn appended.

use sleuth_agent::{EngineEvent, EventEmitter};
use sleuth_core::checkpoint::CheckpointId;
use sleuth_core::error::TurnError;
use sleuth_core::message::{Conversation, Message};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::GatewayState;

/// Buffer between the engine and the relay loop.
const ENGINE_EVENT_BUFFER: usize = 64;

/// Run one turn and stream its wire frames into `frames`.
///
/// The stream always finishes with exactly one `end` frame unless the
/// client has gone away. Returns the checkpoint id the turn ran under.
pub async fn drive_turn(
    state: Arc<GatewayState>,
    message: String,
    checkpoint_id: Option<CheckpointId>,
    frames: mpsc::Sender<String>,
) -> CheckpointId {
    let mut emitter = EventEmitter::new(frames);

    let (id, is_new) = match checkpoint_id {
        Some(id) => (id, false),
        None => (state.store.new_id(), true),
    };

    let _guard = state.locks.acquire(&id).await;
    debug!(checkpoint_id = %id, "Checkpoint lock acquired");

    let history = if is_new {
        let _ = emitter.checkpoint(id.as_str()).await;
        Vec::new()
    } else {
        match state.store.load(&id).await {
            Ok(history) => history,
            Err(e) => {
                error!(checkpoint_id = %id, error = %e, "Failed to load checkpoint");
                let _ = emitter.error(format!("failed to load conversation: {e}")).await;
                emitter.end().await;
                return id;
            }
        }
    };

    info!(checkpoint_id = %id, new = is_new, prior_messages = history.len(), "Turn accepted");

    let mut conversation = Conversation::resume(id.clone(), history);
    let prior_len = conversation.messages.len();

    let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(ENGINE_EVENT_BUFFER);

    let run = async {
        let events = events_tx;
        state
            .engine
            .run(&mut conversation, Message::user(message), &events)
            .await
    };

    let relay = async {
        let mut events = events_rx;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = emitter.engine(&event).await {
                            debug!(error = %e, "Stopped relaying engine events");
                            break;
                        }
                    }
                    None => break,
                },
                _ = emitter.closed() => {
                    info!("Client disconnected mid-turn");
                    break;
                }
            }
        }
    };

    let (outcome, ()) = tokio::join!(run, relay);

    let appended = conversation.appended_since(prior_len);
    let persisted = state.store.append(&id, appended).await;

    let failure = match &outcome {
        Err(TurnError::Cancelled) => {
            info!(checkpoint_id = %id, "Turn cancelled");
            None
        }
        Err(e) => {
            error!(checkpoint_id = %id, error = %e, "Turn failed");
            Some(e.to_string())
        }
        Ok(summary) => {
            info!(
                checkpoint_id = %id,
                cycles = summary.cycles,
                capability_calls = summary.capability_calls,
                "Turn finished"
            );
            None
        }
    };

    let failure = match persisted {
        Ok(()) => {
            debug!(checkpoint_id = %id, count = appended.len(), "Persisted turn");
            failure
        }
        Err(e) => {
            error!(checkpoint_id = %id, error = %e, "Failed to persist turn");
            failure.or_else(|| Some(format!("failed to save conversation: {e}")))
        }
    };

    if let Some(message) = failure {
        if emitter.error(message).await.is_err() {
            warn!(checkpoint_id = %id, "Could not report turn failure to client");
        }
    }
    emitter.end().await;

    id
}
