//! Influence events: asynchronous nudges to the emotional state.
//!
//! An event is validated on submission, queued, and then applied by every
//! tick until its simulated age reaches `duration`.

use crate::dimension::Dimension;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceEvent {
    pub id: Uuid,
    /// Who raised the event (a provider name, "user", ...).
    pub source: String,
    /// Per-dimension deltas in `[-1, 1]`.
    pub deltas: BTreeMap<Dimension, f32>,
    /// Scales every delta, in `[0, 1]`.
    pub intensity: f32,
    /// How long the event keeps contributing. Must be non-zero.
    pub duration: Duration,
    /// Fade rate of the event's own contribution per tick applied. Falls back
    /// to the affected dimension's decay rate.
    pub decay_override: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl InfluenceEvent {
    pub fn new(source: impl Into<String>, intensity: f32, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            deltas: BTreeMap::new(),
            intensity,
            duration,
            decay_override: None,
            created_at: Utc::now(),
        }
    }

    /// Build an event from `(name, delta)` pairs, rejecting unknown names.
    pub fn from_named(
        source: impl Into<String>,
        deltas: &[(&str, f32)],
        intensity: f32,
        duration: Duration,
    ) -> Result<Self, EngineError> {
        let mut event = Self::new(source, intensity, duration);
        for (name, delta) in deltas {
            let dim: Dimension = name
                .parse()
                .map_err(|e| EngineError::InvalidInfluenceEvent(format!("{}", e)))?;
            event.deltas.insert(dim, *delta);
        }
        Ok(event)
    }

    pub fn with_delta(mut self, dim: Dimension, delta: f32) -> Self {
        self.deltas.insert(dim, delta);
        self
    }

    pub fn with_decay_override(mut self, rate: f32) -> Self {
        self.decay_override = Some(rate);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidInfluenceEvent(msg));

        if !self.intensity.is_finite() || !(0.0..=1.0).contains(&self.intensity) {
            return invalid(format!("intensity {} is outside [0, 1]", self.intensity));
        }
        if self.duration.is_zero() {
            return invalid("duration must be greater than zero".to_string());
        }
        if let Some(rate) = self.decay_override {
            if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                return invalid(format!("decay override {} is outside [0, 1]", rate));
            }
        }
        for (dim, delta) in &self.deltas {
            if !delta.is_finite() || !(-1.0..=1.0).contains(delta) {
                return invalid(format!("delta {} for `{}` is outside [-1, 1]", delta, dim));
            }
        }
        Ok(())
    }
}

/// An event that has been pulled off the queue and is being applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveInfluence {
    pub event: InfluenceEvent,
    /// Ticks this event has already contributed to.
    pub ticks_applied: u32,
}

impl ActiveInfluence {
    pub fn new(event: InfluenceEvent) -> Self {
        Self {
            event,
            ticks_applied: 0,
        }
    }

    /// Simulated age at the given tick interval.
    pub fn age(&self, tick_interval: Duration) -> Duration {
        tick_interval.saturating_mul(self.ticks_applied)
    }

    pub fn is_expired(&self, tick_interval: Duration) -> bool {
        self.age(tick_interval) >= self.event.duration
    }
}
