//! The engine as a signal source for the orchestrator.

use crate::engine::EmotionEngine;
use anima_core::{
    ActionTag, Deadline, Dimension, Recommendation, RequestContext, SignalEnvelope,
    SignalProvider, Snapshot, SourceCategory,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Above this, an aversive dominant emotion asks for caution.
const CAUTION_LEVEL: f32 = 0.6;
/// Above this, it asks to defer.
const DEFER_LEVEL: f32 = 0.8;

fn is_aversive(dim: Dimension) -> bool {
    matches!(
        dim,
        Dimension::Fear
            | Dimension::Anger
            | Dimension::Disgust
            | Dimension::Shame
            | Dimension::Doubt
            | Dimension::Confusion
    )
}

fn is_exploratory(dim: Dimension) -> bool {
    matches!(
        dim,
        Dimension::Curiosity
            | Dimension::Wonder
            | Dimension::Fascination
            | Dimension::Awe
            | Dimension::Insight
    )
}

/// Map the dominant emotion of a snapshot to a recommended action.
pub fn action_for(snapshot: &Snapshot) -> ActionTag {
    let dominant = snapshot.dominant;
    if is_aversive(dominant.dimension) {
        if dominant.value > DEFER_LEVEL {
            ActionTag::Defer
        } else if dominant.value > CAUTION_LEVEL {
            ActionTag::ProceedWithCaution
        } else {
            ActionTag::Proceed
        }
    } else if is_exploratory(dominant.dimension) {
        ActionTag::Explore
    } else {
        ActionTag::Proceed
    }
}

/// Answers every request from the engine's latest snapshot. Never waits on
/// a tick.
pub struct EmotionSignalProvider {
    engine: Arc<EmotionEngine>,
}

impl EmotionSignalProvider {
    pub fn new(engine: Arc<EmotionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SignalProvider for EmotionSignalProvider {
    fn name(&self) -> &str {
        "emotion"
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Emotional
    }

    async fn get_signal(
        &self,
        _ctx: &RequestContext,
        _deadline: Deadline,
    ) -> anyhow::Result<SignalEnvelope> {
        let snapshot = self.engine.snapshot();
        let action = action_for(&snapshot);
        let payload = serde_json::json!({
            "tick": snapshot.tick,
            "dominant": snapshot.dominant,
            "secondary": snapshot.secondary,
            "volatility": snapshot.volatility,
        });
        let rationale = format!(
            "{} at {:.2}, then {} at {:.2}",
            snapshot.dominant.dimension,
            snapshot.dominant.value,
            snapshot.secondary.dimension,
            snapshot.secondary.value
        );
        Ok(SignalEnvelope::new(
            self.name(),
            self.category(),
            Recommendation::new(action).with_payload(payload),
            snapshot.stability,
            snapshot.dominant.value,
        )
        .with_rationale(rationale))
    }
}
