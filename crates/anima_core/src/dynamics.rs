//! State Dynamics: one discrete update of the emotional vector.
//!
//! V1 = V0 + D + decay ⊙ (baseline - V0), where D collects active influence
//! events and matrix cross-talk. Cross terms read only the pre-tick vector
//! V0, so the result does not depend on the order dimensions are visited in.

use crate::dimension::{Dimension, EmotionalVector, DIMENSION_COUNT};
use crate::influence::ActiveInfluence;
use crate::physics::PhysicsConfig;
use std::time::Duration;

/// Tick cadence the physics rates are expressed against.
pub const REFERENCE_TICK: Duration = Duration::from_secs(5);

/// Ratio of a tick interval to [`REFERENCE_TICK`].
pub fn tick_fraction(interval: Duration) -> f32 {
    interval.as_secs_f32() / REFERENCE_TICK.as_secs_f32()
}

/// Per-tick decay rate rescaled to a tick of `fraction` reference ticks.
#[inline]
fn effective_decay(rate: f32, fraction: f32) -> f32 {
    if (fraction - 1.0).abs() < f32::EPSILON {
        rate
    } else {
        1.0 - (1.0 - rate).powf(fraction)
    }
}

/// Trait for implementing state dynamics
pub trait Dynamics: Send + Sync {
    /// Compute the post-tick vector from the pre-tick vector `v0`.
    fn step(
        &self,
        v0: &EmotionalVector,
        active: &[ActiveInfluence],
        physics: &PhysicsConfig,
        tick_fraction: f32,
    ) -> EmotionalVector;
}

/// Default dynamics: damped influence events, linear resonance through the
/// influence matrix, exponential pull toward baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResonanceDynamics;

impl ResonanceDynamics {
    /// Summed contribution of all active events (step 2).
    fn event_deltas(
        &self,
        active: &[ActiveInfluence],
        physics: &PhysicsConfig,
    ) -> [f32; DIMENSION_COUNT] {
        let mut delta = [0.0f32; DIMENSION_COUNT];
        for influence in active {
            let event = &influence.event;
            let age = i32::try_from(influence.ticks_applied).unwrap_or(i32::MAX);
            for (dim, d) in &event.deltas {
                let inertia = physics.inertia.factor(*dim);
                let fade_rate = event
                    .decay_override
                    .unwrap_or_else(|| physics.decay.rate(*dim));
                let fade = (1.0 - fade_rate).powi(age);
                delta[dim.index()] += d * event.intensity * (1.0 - inertia) * fade;
            }
        }
        delta
    }
}

impl Dynamics for ResonanceDynamics {
    fn step(
        &self,
        v0: &EmotionalVector,
        active: &[ActiveInfluence],
        physics: &PhysicsConfig,
        tick_fraction: f32,
    ) -> EmotionalVector {
        let mut delta = self.event_deltas(active, physics);

        // Resonance, from V0 only
        for to in Dimension::ALL {
            let mut resonance = 0.0;
            for from in Dimension::ALL {
                let w = physics.influence.get(from, to);
                if w != 0.0 {
                    resonance += v0.get(from) * w;
                }
            }
            delta[to.index()] += resonance * tick_fraction;
        }

        // Decay toward baseline, then clamp
        let mut v1 = EmotionalVector::zeros();
        for dim in Dimension::ALL {
            let baseline = physics.baseline.get(dim);
            let rate = effective_decay(physics.decay.rate(dim), tick_fraction);
            let current = v0.get(dim);
            let next = current + delta[dim.index()] + rate * (baseline - current);
            v1.set_or(dim, next, baseline);
        }
        v1
    }
}

/// Mean absolute distance from baseline (0 = fully at rest).
pub fn baseline_distance(vector: &EmotionalVector, physics: &PhysicsConfig) -> f32 {
    vector.mean_abs_diff(&physics.baseline)
}
