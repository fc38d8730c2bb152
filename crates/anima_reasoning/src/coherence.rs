//! Coherence check of a draft against the continuity reference.

use anima_core::{ActionTag, Fault, OrchestratorConfig};

#[derive(Debug, Clone, Copy)]
pub struct CoherenceCheck {
    pub threshold: f32,
    pub max_retries: u32,
    /// Pull toward the reference on each regeneration, `[0, 1]`.
    pub amplification: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoherenceVerdict {
    pub action: ActionTag,
    /// Divergence of `action` from the reference.
    pub divergence: f32,
    pub regenerations: u32,
    pub incoherent: bool,
}

impl CoherenceVerdict {
    pub fn fault(&self, threshold: f32) -> Option<Fault> {
        self.incoherent.then_some(Fault::CoherenceFailure {
            divergence: self.divergence,
            threshold,
        })
    }
}

pub fn divergence(a: ActionTag, b: ActionTag) -> f32 {
    (a.engagement() - b.engagement()).abs()
}

impl CoherenceCheck {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            threshold: config.coherence_threshold,
            max_retries: config.coherence_max_retries,
            amplification: config.continuity_amplification.clamp(0.0, 1.0),
        }
    }

    /// Compare `draft` with `reference`, regenerating toward the reference
    /// while it still diverges and retries remain.
    pub fn check(&self, draft: ActionTag, reference: ActionTag) -> CoherenceVerdict {
        let mut action = draft;
        let mut regenerations = 0;
        while divergence(action, reference) > self.threshold && regenerations < self.max_retries {
            let blended = (1.0 - self.amplification) * action.engagement()
                + self.amplification * reference.engagement();
            action = ActionTag::nearest(blended, |_| true).unwrap_or(action);
            regenerations += 1;
        }
        let divergence = divergence(action, reference);
        CoherenceVerdict {
            action,
            divergence,
            regenerations,
            incoherent: divergence > self.threshold,
        }
    }
}
