//! Error taxonomy.
//!
//! Only [`EngineError`] ever reaches a caller. Everything else the core can
//! recover from is recorded as a [`Fault`] next to the value it degraded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible errors from the emotional state engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid influence event: {0}")]
    InvalidInfluenceEvent(String),

    #[error("invalid physics configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported state blob version {found} (expected {expected})")]
    UnsupportedBlobVersion { found: u32, expected: u32 },

    #[error("state blob could not be decoded: {0}")]
    MalformedBlob(#[from] serde_json::Error),
}

/// A failure that was recovered locally and degraded a result instead of
/// aborting it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    #[error("signal provider `{provider}` degraded: {reason}")]
    SourceDegraded { provider: String, reason: String },

    #[error("conflict deadlock after {iterations} synthesis iterations, used precedence fallback")]
    ConflictDeadlock { iterations: u32 },

    #[error("coherence failure: divergence {divergence:.2} exceeds {threshold:.2}")]
    CoherenceFailure { divergence: f32, threshold: f32 },

    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    #[error("aggregate deadline of {budget_ms}ms exceeded")]
    DeadlineExceeded { budget_ms: u64 },
}
