//! Conflict detection and resolution between provider signals.
//!
//! Two signals conflict when their actions are not compatible and both are
//! confident enough to matter. Resolution first looks for a middle-ground
//! action every party can live with, relaxing category precedence a little
//! on each attempt. Strictly exclusive pairs skip that search and go
//! straight to precedence.

use anima_core::{
    ActionTag, ConflictRecord, Exclusivity, OrchestratorConfig, PriorityTable, Recommendation,
    ResolutionOutcome, ResolutionStrategy, SignalEnvelope,
};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// Every unordered pair with non-compatible actions where both confidences
/// exceed `materiality`.
pub fn detect_conflicts(envelopes: &[SignalEnvelope], materiality: f32) -> Vec<ConflictRecord> {
    let mut conflicts = Vec::new();
    for (i, a) in envelopes.iter().enumerate() {
        for b in &envelopes[i + 1..] {
            if a.confidence > materiality
                && b.confidence > materiality
                && !a.action().is_compatible_with(b.action())
            {
                conflicts.push(ConflictRecord::between(a, b));
            }
        }
    }
    conflicts
}

/// Precedence descending, then confidence descending, then id ascending.
pub fn fallback_order(precedence: &PriorityTable, a: &SignalEnvelope, b: &SignalEnvelope) -> Ordering {
    precedence
        .precedence(b.category)
        .total_cmp(&precedence.precedence(a.category))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.id.cmp(&b.id))
}

/// The envelope that wins on precedence alone.
pub fn precedence_pick<'a>(
    precedence: &PriorityTable,
    envelopes: impl IntoIterator<Item = &'a SignalEnvelope>,
) -> Option<&'a SignalEnvelope> {
    envelopes
        .into_iter()
        .min_by(|a, b| fallback_order(precedence, a, b))
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    pub precedence: PriorityTable,
    pub max_iterations: u32,
    pub tolerance: f32,
}

impl ConflictResolver {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            precedence: config.precedence.clone(),
            max_iterations: config.synthesis_max_iterations,
            tolerance: config.synthesis_tolerance,
        }
    }

    /// Resolve `conflicts` among `envelopes`. Returns `None` when there is
    /// nothing to resolve.
    pub fn resolve(
        &self,
        envelopes: &[SignalEnvelope],
        conflicts: Vec<ConflictRecord>,
    ) -> Option<ResolutionOutcome> {
        let candidates: Vec<&SignalEnvelope> = envelopes
            .iter()
            .filter(|e| conflicts.iter().any(|c| c.involves(e.id)))
            .collect();
        let winner = precedence_pick(&self.precedence, candidates.iter().copied())?;

        let strict = candidates.iter().enumerate().any(|(i, a)| {
            candidates[i + 1..]
                .iter()
                .any(|b| a.action().exclusivity(b.action()) == Exclusivity::Strict)
        });
        if strict {
            tracing::debug!(winner = %winner.provider, "Strict conflict, precedence decides");
            return Some(ResolutionOutcome {
                conflicts,
                strategy: ResolutionStrategy::Fallback,
                recommendation: winner.recommendation.clone(),
                confidence: winner.confidence,
                chosen: Some(winner.id),
                iterations: 0,
                low_confidence: false,
            });
        }

        let compatible_with_all =
            |tag: ActionTag| candidates.iter().all(|c| tag.is_compatible_with(c.action()));

        for k in 0..self.max_iterations {
            let gamma = 1.0 - k as f32 / self.max_iterations as f32;
            let weights: Vec<f32> = candidates
                .iter()
                .map(|c| self.precedence.precedence(c.category).powf(gamma) * c.confidence)
                .collect();
            let total: f32 = weights.iter().sum();
            if total <= f32::EPSILON {
                break;
            }
            let position = candidates
                .iter()
                .zip(&weights)
                .map(|(c, w)| c.action().engagement() * w)
                .sum::<f32>()
                / total;

            let Some(tag) = ActionTag::nearest(position, compatible_with_all) else {
                break;
            };
            if (tag.engagement() - position).abs() <= self.tolerance {
                let confidence = candidates
                    .iter()
                    .zip(&weights)
                    .map(|(c, w)| c.confidence * w)
                    .sum::<f32>()
                    / total;
                tracing::debug!(
                    action = %tag,
                    iteration = k + 1,
                    "Conflict synthesized"
                );
                return Some(ResolutionOutcome {
                    conflicts,
                    strategy: ResolutionStrategy::Synthesis,
                    recommendation: Recommendation::new(tag).with_payload(merge_payloads(&candidates)),
                    confidence,
                    chosen: None,
                    iterations: k + 1,
                    low_confidence: false,
                });
            }
        }

        tracing::warn!(
            iterations = self.max_iterations,
            winner = %winner.provider,
            "Synthesis did not converge, falling back to precedence"
        );
        Some(ResolutionOutcome {
            conflicts,
            strategy: ResolutionStrategy::DeadlockDefault,
            recommendation: winner.recommendation.clone(),
            confidence: winner.confidence / 2.0,
            chosen: Some(winner.id),
            iterations: self.max_iterations,
            low_confidence: true,
        })
    }
}

/// One annotation line describing how a resolution came about.
pub fn describe(resolution: &ResolutionOutcome, envelopes: &[SignalEnvelope]) -> String {
    let parties: Vec<String> = envelopes
        .iter()
        .filter(|e| resolution.conflicts.iter().any(|c| c.involves(e.id)))
        .map(|e| format!("{} ({})", e.action(), e.category))
        .collect();
    let action = resolution.recommendation.action;
    match resolution.strategy {
        ResolutionStrategy::Synthesis => {
            format!("{action}, noting the tension between {}", parties.join(" and "))
        }
        ResolutionStrategy::Fallback => {
            format!("{action} by precedence over {}", parties.join(" and "))
        }
        ResolutionStrategy::DeadlockDefault => format!(
            "{action} by precedence after {} synthesis attempts between {}; low confidence",
            resolution.iterations,
            parties.join(" and ")
        ),
    }
}

fn merge_payloads(candidates: &[&SignalEnvelope]) -> Value {
    let mut sources = Map::new();
    for c in candidates {
        if !c.recommendation.payload.is_null() {
            sources.insert(c.provider.clone(), c.recommendation.payload.clone());
        }
    }
    json!({
        "synthesized_from": candidates.iter().map(|c| c.id).collect::<Vec<_>>(),
        "sources": sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::SourceCategory;
    use uuid::Uuid;

    fn env(category: SourceCategory, action: ActionTag, confidence: f32) -> SignalEnvelope {
        SignalEnvelope::new(category.as_str(), category, Recommendation::new(action), confidence, 0.5)
    }

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(&OrchestratorConfig::default())
    }

    #[test]
    fn test_detect_requires_materiality() {
        let envelopes = vec![
            env(SourceCategory::Safety, ActionTag::Decline, 0.9),
            env(SourceCategory::Goal, ActionTag::Proceed, 0.3),
            env(SourceCategory::Emotional, ActionTag::Explore, 0.8),
        ];
        let conflicts = detect_conflicts(&envelopes, 0.4);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].actions, (ActionTag::Decline, ActionTag::Explore));
        assert_eq!(conflicts[0].exclusivity, Exclusivity::Strict);
    }

    #[test]
    fn test_compatible_actions_do_not_conflict() {
        let envelopes = vec![
            env(SourceCategory::Safety, ActionTag::Proceed, 0.9),
            env(SourceCategory::Goal, ActionTag::Explore, 0.9),
        ];
        assert!(detect_conflicts(&envelopes, 0.4).is_empty());
    }

    #[test]
    fn test_strict_conflict_falls_back_to_precedence() {
        let envelopes = vec![
            env(SourceCategory::Goal, ActionTag::Proceed, 0.95),
            env(SourceCategory::Safety, ActionTag::Decline, 0.7),
        ];
        let conflicts = detect_conflicts(&envelopes, 0.4);
        let outcome = resolver().resolve(&envelopes, conflicts).unwrap();
        assert_eq!(outcome.strategy, ResolutionStrategy::Fallback);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.recommendation.action, ActionTag::Decline);
        assert_eq!(outcome.chosen, Some(envelopes[1].id));
        assert_eq!(outcome.confidence, 0.7);
    }

    #[test]
    fn test_soft_conflict_synthesizes_middle_ground() {
        let envelopes = vec![
            env(SourceCategory::Goal, ActionTag::Proceed, 0.8)
                .with_rationale("user asked for it"),
            env(SourceCategory::Emotional, ActionTag::Defer, 0.7),
        ];
        let conflicts = detect_conflicts(&envelopes, 0.4);
        assert_eq!(conflicts[0].exclusivity, Exclusivity::Soft);

        let outcome = resolver().resolve(&envelopes, conflicts).unwrap();
        assert_eq!(outcome.strategy, ResolutionStrategy::Synthesis);
        assert_eq!(outcome.recommendation.action, ActionTag::ProceedWithCaution);
        assert_eq!(outcome.chosen, None);
        assert!(!outcome.low_confidence);
        assert!(outcome.iterations >= 1);
        assert!(outcome.confidence > 0.7 && outcome.confidence < 0.8);
        assert_eq!(
            outcome.recommendation.payload["synthesized_from"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        let note = describe(&outcome, &envelopes);
        assert!(note.starts_with("proceed_with_caution"), "{note}");
    }

    #[test]
    fn test_unbridgeable_conflict_deadlocks() {
        // Explore and Clarify only meet at ProceedWithCaution, far from a
        // blend dominated by the safety signal.
        let envelopes = vec![
            env(SourceCategory::Safety, ActionTag::Explore, 0.95),
            env(SourceCategory::Memory, ActionTag::Clarify, 0.45),
        ];
        let conflicts = detect_conflicts(&envelopes, 0.4);
        let outcome = resolver().resolve(&envelopes, conflicts).unwrap();
        assert_eq!(outcome.strategy, ResolutionStrategy::DeadlockDefault);
        assert_eq!(outcome.iterations, 5);
        assert!(outcome.low_confidence);
        assert_eq!(outcome.recommendation.action, ActionTag::Explore);
        assert!((outcome.confidence - 0.475).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_order_ties() {
        let table = PriorityTable::default();
        let low_id = env(SourceCategory::Goal, ActionTag::Proceed, 0.6).with_id(Uuid::from_u128(1));
        let high_id = env(SourceCategory::Goal, ActionTag::Defer, 0.6).with_id(Uuid::from_u128(2));
        let confident = env(SourceCategory::Goal, ActionTag::Clarify, 0.9).with_id(Uuid::from_u128(3));
        let safety = env(SourceCategory::Safety, ActionTag::Decline, 0.1).with_id(Uuid::from_u128(4));

        let all = [high_id.clone(), low_id.clone()];
        assert_eq!(precedence_pick(&table, &all).unwrap().id, low_id.id);
        let all = [low_id, confident.clone()];
        assert_eq!(precedence_pick(&table, &all).unwrap().id, confident.id);
        let all = [confident, safety.clone()];
        assert_eq!(precedence_pick(&table, &all).unwrap().id, safety.id);
    }

    #[test]
    fn test_nothing_to_resolve() {
        let envelopes = vec![env(SourceCategory::Goal, ActionTag::Proceed, 0.8)];
        assert!(resolver().resolve(&envelopes, vec![]).is_none());
    }
}
