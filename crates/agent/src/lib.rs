//! The turn engine: the heart of Sleuth.
//!
//! A turn follows a **Reason → Act** cycle:
//!
//! 1. **Reason**: send the history (plus system prompt) to the model and
//!    stream its answer
//! 2. **Act**: if the model requested capabilities, invoke each one in
//!    order and append its result, then reason again
//! 3. **Terminal**: the model answered without requesting anything
//!
//! Progress is reported as [`EngineEvent`]s; the [`EventEmitter`] turns
//! them into the client-facing [`StreamEvent`] wire records.

pub mod emitter;
pub mod engine;
pub mod event;

#[cfg(test)]
mod test_helpers;

pub use emitter::{EmitError, EventEmitter, StreamEvent, encode};
pub use engine::{TurnEngine, TurnSummary};
pub use event::EngineEvent;
