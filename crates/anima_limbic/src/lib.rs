//! # Anima Limbic
//!
//! The emotional state engine. One [`EmotionEngine`] owns a 27-dimensional
//! emotional vector and advances it on a fixed heartbeat:
//!
//! 1. Influence events queued since the last tick become active
//! 2. Active events, matrix resonance and decay toward baseline are applied
//! 3. A new immutable [`Snapshot`](anima_core::Snapshot) is published
//!
//! Readers only ever see snapshots, so they never wait on a tick. The engine
//! also persists itself through a [`StateStore`](anima_core::StateStore) and
//! lets its baseline drift slowly toward how it has actually felt.

mod drift;
mod engine;
mod heartbeat;
mod provider;
pub mod state;

pub use drift::DriftAccumulator;
pub use engine::EmotionEngine;
pub use heartbeat::HeartbeatConfig;
pub use provider::{action_for, EmotionSignalProvider};
pub use state::{PersistedState, BLOB_VERSION};
