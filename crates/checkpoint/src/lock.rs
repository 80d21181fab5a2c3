//! Per-checkpoint turn locks.
//!
//! Two requests carrying the same checkpoint id must not run their turns
//! concurrently, or their appended messages would interleave. Different
//! checkpoints never wait on each other.

use sleuth_core::checkpoint::CheckpointId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Held for the duration of one turn. Dropping it admits the next waiter.
pub struct CheckpointGuard {
    _guard: OwnedMutexGuard<()>,
}

/// A table of async mutexes keyed by checkpoint id.
#[derive(Default)]
pub struct CheckpointLocks {
    table: Mutex<HashMap<CheckpointId, Arc<AsyncMutex<()>>>>,
}

impl CheckpointLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other turn holds `id`, then take it.
    pub async fn acquire(&self, id: &CheckpointId) -> CheckpointGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on are dead weight.
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
            table.entry(id.clone()).or_default().clone()
        };

        if slot.try_lock().is_err() {
            debug!(checkpoint_id = %id, "Waiting for in-flight turn on checkpoint");
        }

        CheckpointGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of checkpoints currently tracked.
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
