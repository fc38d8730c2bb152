//! Slow baseline drift.
//!
//! The engine keeps a running sum of post-tick vectors. Once per drift
//! period the baseline moves toward their mean, at most `max_drift` per
//! dimension, and the accumulator starts over.

use anima_core::{Dimension, EmotionalVector, DIMENSION_COUNT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAccumulator {
    sums: Vec<f64>,
    samples: u64,
}

impl Default for DriftAccumulator {
    fn default() -> Self {
        Self {
            sums: vec![0.0; DIMENSION_COUNT],
            samples: 0,
        }
    }
}

impl DriftAccumulator {
    pub fn record(&mut self, vector: &EmotionalVector) {
        // Blobs from elsewhere may carry a short sum vector.
        self.sums.resize(DIMENSION_COUNT, 0.0);
        for (i, v) in vector.as_array().iter().enumerate() {
            self.sums[i] += f64::from(*v);
        }
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn mean(&self) -> Option<EmotionalVector> {
        if self.samples == 0 {
            return None;
        }
        let n = self.samples as f64;
        Some(EmotionalVector::from_pairs(
            Dimension::ALL
                .iter()
                .map(|d| (*d, (self.sums.get(d.index()).copied().unwrap_or(0.0) / n) as f32)),
        ))
    }

    /// Baseline shifted toward the mean, each dimension by at most `max_drift`.
    pub fn shifted(&self, baseline: &EmotionalVector, max_drift: f32) -> EmotionalVector {
        let Some(mean) = self.mean() else {
            return *baseline;
        };
        let mut next = *baseline;
        for dim in Dimension::ALL {
            let shift = (mean.get(dim) - baseline.get(dim)).clamp(-max_drift, max_drift);
            next.set(dim, baseline.get(dim) + shift);
        }
        next
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_accumulator_keeps_baseline() {
        let acc = DriftAccumulator::default();
        let base = EmotionalVector::uniform(0.3);
        assert_eq!(acc.shifted(&base, 0.05), base);
    }

    #[test]
    fn test_shift_is_bounded() {
        let mut acc = DriftAccumulator::default();
        for _ in 0..4 {
            acc.record(&EmotionalVector::uniform(0.3).with(Dimension::Joy, 0.9));
        }
        let base = EmotionalVector::uniform(0.3);
        let next = acc.shifted(&base, 0.05);
        assert!((next.get(Dimension::Joy) - 0.35).abs() < 1e-6);
        assert!((next.get(Dimension::Fear) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_small_shift_reaches_mean() {
        let mut acc = DriftAccumulator::default();
        acc.record(&EmotionalVector::uniform(0.32));
        let next = acc.shifted(&EmotionalVector::uniform(0.3), 0.05);
        assert!((next.get(Dimension::Awe) - 0.32).abs() < 1e-6);
        acc.reset();
        assert_eq!(acc.samples(), 0);
    }
}
