//! Decision-side types produced by the orchestrator.

use crate::error::Fault;
use crate::signal::{ActionTag, Exclusivity, Recommendation, SignalEnvelope, SourceCategory};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Tier
// ============================================================================

/// Processing tier chosen from the attention score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Answer directly from the draft.
    Fast,
    Standard,
    /// Standard answer now, deeper processing requested in the background.
    StandardDeepAsync,
}

impl Tier {
    pub fn from_score(score: f32, fast_threshold: f32, deep_threshold: f32) -> Self {
        if score < fast_threshold {
            Tier::Fast
        } else if score < deep_threshold {
            Tier::Standard
        } else {
            Tier::StandardDeepAsync
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Standard => "standard",
            Tier::StandardDeepAsync => "standard_deep_async",
        }
    }
}

// ============================================================================
// Conflicts and their resolution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// A middle-ground action was found.
    Synthesis,
    /// The highest-precedence envelope won outright.
    Fallback,
    /// Synthesis ran out of iterations; precedence decided with low confidence.
    DeadlockDefault,
}

/// One pair of envelopes whose actions contradict each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub envelopes: (Uuid, Uuid),
    pub categories: (SourceCategory, SourceCategory),
    pub actions: (ActionTag, ActionTag),
    pub exclusivity: Exclusivity,
}

impl ConflictRecord {
    pub fn between(a: &SignalEnvelope, b: &SignalEnvelope) -> Self {
        Self {
            envelopes: (a.id, b.id),
            categories: (a.category, b.category),
            actions: (a.action(), b.action()),
            exclusivity: a.action().exclusivity(b.action()),
        }
    }

    pub fn involves(&self, id: Uuid) -> bool {
        self.envelopes.0 == id || self.envelopes.1 == id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub conflicts: Vec<ConflictRecord>,
    pub strategy: ResolutionStrategy,
    pub recommendation: Recommendation,
    pub confidence: f32,
    /// Envelope that won, if one did. `None` after a synthesis.
    pub chosen: Option<Uuid>,
    pub iterations: u32,
    pub low_confidence: bool,
}

// ============================================================================
// Request lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    FanningOut,
    Scoring,
    Resolving,
    SynthesizingDraft,
    CoherenceChecking,
    Regenerating,
    Done,
    DoneDegraded,
}

impl RequestPhase {
    pub fn can_transition_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (FanningOut, Scoring)
                | (Scoring, Resolving)
                | (Scoring, SynthesizingDraft)
                | (Resolving, SynthesizingDraft)
                | (SynthesizingDraft, CoherenceChecking)
                | (SynthesizingDraft, Done)
                | (SynthesizingDraft, DoneDegraded)
                | (CoherenceChecking, Regenerating)
                | (CoherenceChecking, Done)
                | (CoherenceChecking, DoneDegraded)
                | (Regenerating, Done)
                | (Regenerating, DoneDegraded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestPhase::Done | RequestPhase::DoneDegraded)
    }
}

/// Result of one orchestrated request. Always produced, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub request_id: Uuid,
    pub tier: Tier,
    pub attention_score: f32,
    pub recommendation: Recommendation,
    pub confidence: f32,
    pub annotations: Vec<String>,
    pub incoherent: bool,
    /// Providers that failed or missed their deadline.
    pub degraded_sources: Vec<String>,
    /// Present when conflicts had to be resolved.
    pub resolution: Option<ResolutionOutcome>,
    pub faults: Vec<Fault>,
    pub deadline_exceeded: bool,
    pub phase: RequestPhase,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl Outcome {
    pub fn action(&self) -> ActionTag {
        self.recommendation.action
    }

    pub fn is_degraded(&self) -> bool {
        self.phase == RequestPhase::DoneDegraded
    }

    pub fn is_deadlocked(&self) -> bool {
        self.resolution
            .as_ref()
            .is_some_and(|r| r.strategy == ResolutionStrategy::DeadlockDefault)
    }
}

/// Everything worth journaling about a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub outcome: Outcome,
    pub conflicts: Vec<ConflictRecord>,
    pub phases: Vec<RequestPhase>,
    pub envelopes: Vec<SignalEnvelope>,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
