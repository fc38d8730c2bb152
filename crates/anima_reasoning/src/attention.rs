//! Attention score and processing tier.
//!
//! The score is the salience of every collected signal weighted by how much
//! its category deserves attention. Categories without a configured weight
//! still count, at `min_weight`.

use anima_core::{AttentionWeights, OrchestratorConfig, SignalEnvelope, Tier};

pub fn attention_score(envelopes: &[SignalEnvelope], weights: &AttentionWeights, min_weight: f32) -> f32 {
    envelopes
        .iter()
        .map(|e| weights.weight(e.category, min_weight) * e.salience)
        .sum()
}

pub fn select_tier(score: f32, config: &OrchestratorConfig) -> Tier {
    Tier::from_score(score, config.fast_threshold, config.deep_threshold)
}
