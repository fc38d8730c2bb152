//! Property-based tests for anima_core.
//!
//! Uses proptest to verify invariants that must hold for ALL possible inputs,
//! not just hand-picked examples.

use anima_core::dynamics::{tick_fraction, Dynamics, ResonanceDynamics, REFERENCE_TICK};
use anima_core::{
    ActionTag, ActiveInfluence, Dimension, EmotionalVector, InfluenceEvent, PhysicsConfig,
    Snapshot, VolatilityWindow, DIMENSION_COUNT,
};
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Strategies
// ============================================================================

fn arb_vector() -> impl Strategy<Value = EmotionalVector> {
    prop::collection::vec(0.0f32..=1.0, DIMENSION_COUNT).prop_map(|values| {
        EmotionalVector::from_pairs(Dimension::ALL.iter().copied().zip(values))
    })
}

fn arb_dimension() -> impl Strategy<Value = Dimension> {
    (0..DIMENSION_COUNT).prop_map(|i| Dimension::ALL[i])
}

/// Valid events only: what `submit_influence` would accept.
fn arb_event() -> impl Strategy<Value = InfluenceEvent> {
    (
        prop::collection::vec((arb_dimension(), -1.0f32..=1.0), 1..6),
        0.0f32..=1.0,
        1u64..=120,
        prop::option::of(0.0f32..=1.0),
    )
        .prop_map(|(deltas, intensity, secs, decay)| {
            let mut event = InfluenceEvent::new("prop", intensity, Duration::from_secs(secs));
            for (dim, d) in deltas {
                event = event.with_delta(dim, d);
            }
            if let Some(rate) = decay {
                event = event.with_decay_override(rate);
            }
            event
        })
}

fn arb_tick() -> impl Strategy<Value = Duration> {
    (100u64..=20_000).prop_map(Duration::from_millis)
}

fn in_range(v: &EmotionalVector) -> bool {
    v.iter().all(|(_, x)| x.is_finite() && (0.0..=1.0).contains(&x))
}

// ============================================================================
// Dynamics
// ============================================================================

proptest! {
    /// **Core invariant**: any sequence of valid events over any number of
    /// ticks keeps every dimension finite and within [0, 1].
    #[test]
    fn step_sequence_stays_in_range(
        start in arb_vector(),
        events in prop::collection::vec(arb_event(), 0..8),
        ticks in 1usize..60,
        interval in arb_tick(),
    ) {
        let physics = PhysicsConfig::default();
        let fraction = tick_fraction(interval);
        let mut active: Vec<ActiveInfluence> = events.into_iter().map(ActiveInfluence::new).collect();
        let mut v = start;
        for _ in 0..ticks {
            v = ResonanceDynamics.step(&v, &active, &physics, fraction);
            prop_assert!(in_range(&v), "out of range: {:?}", v);
            for a in active.iter_mut() {
                a.ticks_applied += 1;
            }
            active.retain(|a| !a.is_expired(interval));
        }
    }

    /// With no events and no cross-talk, every step moves each dimension
    /// toward its baseline and never past it.
    #[test]
    fn quiet_step_approaches_baseline(start in arb_vector(), baseline in arb_vector()) {
        let physics = PhysicsConfig::without_influence().with_baseline(baseline);
        let next = ResonanceDynamics.step(&start, &[], &physics, 1.0);
        for dim in Dimension::ALL {
            let before = (start.get(dim) - baseline.get(dim)).abs();
            let after = (next.get(dim) - baseline.get(dim)).abs();
            prop_assert!(after <= before + 1e-6, "{} moved away from baseline", dim);
        }
    }

    /// Zero-intensity events change nothing.
    #[test]
    fn zero_intensity_events_are_inert(start in arb_vector(), event in arb_event()) {
        let physics = PhysicsConfig::default();
        let mut silent = event;
        silent.intensity = 0.0;
        let with_event = ResonanceDynamics.step(&start, &[ActiveInfluence::new(silent)], &physics, 1.0);
        let without = ResonanceDynamics.step(&start, &[], &physics, 1.0);
        prop_assert_eq!(with_event, without);
    }
}

// ============================================================================
// Snapshots
// ============================================================================

proptest! {
    #[test]
    fn snapshot_scores_are_bounded(
        vectors in prop::collection::vec(arb_vector(), 1..30),
    ) {
        let mut window = VolatilityWindow::default();
        for v in &vectors {
            window.push(*v);
        }
        let vol = window.volatility();
        prop_assert!(vol >= 0.0 && vol <= 0.25 + 1e-6);
        let snap = Snapshot::new(vectors.len() as u64, vectors[vectors.len() - 1], vol);
        prop_assert!((0.0..=1.0).contains(&snap.stability));
        prop_assert!(snap.dominant.value >= snap.secondary.value);
        prop_assert_ne!(snap.dominant.dimension, snap.secondary.dimension);
    }
}

// ============================================================================
// Actions
// ============================================================================

proptest! {
    #[test]
    fn nearest_tag_is_allowed_and_closest(position in 0.0f32..=1.0, mask in 1u8..64) {
        let allowed = |t: ActionTag| {
            let i = ActionTag::ALL.iter().position(|x| *x == t).unwrap_or(0);
            mask & (1 << i) != 0
        };
        let tag = ActionTag::nearest(position, allowed).unwrap();
        prop_assert!(allowed(tag));
        let d = (tag.engagement() - position).abs();
        for other in ActionTag::ALL.iter().copied().filter(|t| allowed(*t)) {
            prop_assert!(d <= (other.engagement() - position).abs() + 1e-4);
        }
    }
}

#[test]
fn reference_tick_fraction_is_one() {
    assert_eq!(tick_fraction(REFERENCE_TICK), 1.0);
}
