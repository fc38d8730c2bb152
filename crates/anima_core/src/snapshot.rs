//! Immutable point-in-time views of the emotional state.

use crate::dimension::{Dimension, DimensionReading, EmotionalVector, DIMENSION_COUNT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of snapshots kept for volatility.
pub const DEFAULT_WINDOW: usize = 12;

/// Published once per tick. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick that produced this snapshot (0 = initial state).
    pub tick: u64,
    pub vector: EmotionalVector,
    pub timestamp: DateTime<Utc>,
    pub dominant: DimensionReading,
    pub secondary: DimensionReading,
    /// Rolling variance over the window, averaged across dimensions.
    pub volatility: f32,
    /// `1 - 2·√volatility`, clamped to `[0, 1]`.
    pub stability: f32,
}

impl Snapshot {
    pub fn new(tick: u64, vector: EmotionalVector, volatility: f32) -> Self {
        let (dominant, secondary) = vector.top_two();
        let volatility = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
        Self {
            tick,
            vector,
            timestamp: Utc::now(),
            dominant,
            secondary,
            volatility,
            stability: (1.0 - 2.0 * volatility.sqrt()).clamp(0.0, 1.0),
        }
    }

    /// Snapshot of a vector with no history.
    pub fn initial(vector: EmotionalVector) -> Self {
        Self::new(0, vector, 0.0)
    }

    pub fn get(&self, dim: Dimension) -> f32 {
        self.vector.get(dim)
    }
}

/// Bounded rolling window of recent vectors.
#[derive(Debug, Clone)]
pub struct VolatilityWindow {
    capacity: usize,
    samples: VecDeque<EmotionalVector>,
}

impl VolatilityWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, vector: EmotionalVector) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(vector);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Population variance per dimension, averaged over all dimensions.
    /// Fewer than two samples have no variance.
    pub fn volatility(&self) -> f32 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let n_f = n as f32;
        let mut total = 0.0;
        for i in 0..DIMENSION_COUNT {
            let mean = self.samples.iter().map(|v| v.as_array()[i]).sum::<f32>() / n_f;
            let var = self
                .samples
                .iter()
                .map(|v| {
                    let d = v.as_array()[i] - mean;
                    d * d
                })
                .sum::<f32>()
                / n_f;
            total += var;
        }
        total / DIMENSION_COUNT as f32
    }
}

impl Default for VolatilityWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
