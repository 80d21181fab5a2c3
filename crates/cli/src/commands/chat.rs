//! `sleuth chat`: Run one turn locally and print its wire events.
//!
//! Each event is printed as one JSON line, exactly as the gateway would
//! send it in a `data:` frame.

use sleuth_config::AppConfig;
use sleuth_core::checkpoint::CheckpointId;
use sleuth_gateway::{GatewayState, drive_turn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::serve::require_api_key;

pub async fn run(
    message: String,
    checkpoint: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if message.trim().is_empty() {
        return Err("message must not be empty".into());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    require_api_key(&config)?;

    let state = Arc::new(GatewayState::from_config(config).await?);
    state
        .store
        .health_check()
        .await
        .map_err(|e| format!("Checkpoint store not ready: {e}"))?;

    let (tx, mut rx) = mpsc::channel(64);
    let turn = tokio::spawn(drive_turn(
        state,
        message,
        checkpoint.map(CheckpointId::from),
        tx,
    ));

    let mut frames = 0usize;
    while let Some(frame) = rx.recv().await {
        println!("{frame}");
        frames += 1;
    }

    let id = turn.await?;
    debug!(checkpoint_id = %id, frames, "Turn stream closed");
    eprintln!("checkpoint: {id}");
    Ok(())
}
