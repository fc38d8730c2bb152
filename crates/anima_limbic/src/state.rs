//! Persisted engine state and its versioned blob encoding.

use crate::drift::DriftAccumulator;
use anima_core::{ActiveInfluence, EmotionalVector, EngineError, InfluenceEvent, StateBlob};
use serde::{Deserialize, Serialize};

/// Current blob layout. Bump when `PersistedState` changes shape.
pub const BLOB_VERSION: u32 = 1;

/// Everything needed to resume an engine where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub tick: u64,
    pub vector: EmotionalVector,
    pub baseline: EmotionalVector,
    /// Events being applied, with their age.
    pub active: Vec<ActiveInfluence>,
    /// Events submitted but not yet picked up by a tick.
    pub pending: Vec<InfluenceEvent>,
    #[serde(default)]
    pub drift: DriftAccumulator,
}

impl PersistedState {
    pub fn encode(&self) -> Result<StateBlob, EngineError> {
        Ok(StateBlob::new(BLOB_VERSION, serde_json::to_vec(self)?))
    }

    pub fn decode(blob: &StateBlob) -> Result<Self, EngineError> {
        if blob.version != BLOB_VERSION {
            return Err(EngineError::UnsupportedBlobVersion {
                found: blob.version,
                expected: BLOB_VERSION,
            });
        }
        let state: PersistedState = serde_json::from_slice(&blob.bytes)?;
        for event in state
            .pending
            .iter()
            .chain(state.active.iter().map(|a| &a.event))
        {
            event.validate()?;
        }
        Ok(state)
    }
}
