//! Physics parameters for the emotional state engine.
//!
//! Immutable for the duration of a tick; swapped wholesale by
//! `EmotionEngine::configure`. Rates are per tick at the reference cadence.

use crate::dimension::{Dimension, EmotionalVector, Partition, DIMENSION_COUNT};
use crate::error::EngineError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Per-dimension decay-to-baseline rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayRates {
    pub primary: f32,
    pub aesthetic: f32,
    pub social: f32,
    pub cognitive: f32,
    /// Per-dimension overrides, taking precedence over the partition rate.
    pub overrides: BTreeMap<Dimension, f32>,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            primary: 0.02,
            aesthetic: 0.005,
            social: 0.01,
            cognitive: 0.015,
            overrides: BTreeMap::new(),
        }
    }
}

impl DecayRates {
    pub fn rate(&self, dim: Dimension) -> f32 {
        if let Some(rate) = self.overrides.get(&dim) {
            return *rate;
        }
        match dim.partition() {
            Partition::Primary => self.primary,
            Partition::Aesthetic => self.aesthetic,
            Partition::Social => self.social,
            Partition::Cognitive => self.cognitive,
        }
    }
}

/// Damping applied to incoming influence (0 = no damping, 1 = immovable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertiaConfig {
    pub default: f32,
    pub overrides: BTreeMap<Dimension, f32>,
}

impl Default for InertiaConfig {
    fn default() -> Self {
        Self {
            default: 0.3,
            overrides: BTreeMap::new(),
        }
    }
}

impl InertiaConfig {
    pub fn factor(&self, dim: Dimension) -> f32 {
        self.overrides.get(&dim).copied().unwrap_or(self.default)
    }
}

/// One signed entry of the influence matrix, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    pub from: Dimension,
    pub to: Dimension,
    pub weight: f32,
}

/// Dense 27×27 signed cross-influence matrix. Row = source, column = affected.
///
/// Serialized sparsely as a list of non-zero [`Coupling`]s.
#[derive(Clone, PartialEq)]
pub struct InfluenceMatrix {
    weights: Vec<f32>,
}

impl std::fmt::Debug for InfluenceMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.couplings()).finish()
    }
}

impl InfluenceMatrix {
    pub fn zeros() -> Self {
        Self {
            weights: vec![0.0; DIMENSION_COUNT * DIMENSION_COUNT],
        }
    }

    pub fn from_couplings<I>(couplings: I) -> Self
    where
        I: IntoIterator<Item = Coupling>,
    {
        let mut matrix = Self::zeros();
        for c in couplings {
            matrix.set(c.from, c.to, c.weight);
        }
        matrix
    }

    #[inline]
    pub fn get(&self, from: Dimension, to: Dimension) -> f32 {
        self.weights[from.index() * DIMENSION_COUNT + to.index()]
    }

    pub fn set(&mut self, from: Dimension, to: Dimension, weight: f32) {
        self.weights[from.index() * DIMENSION_COUNT + to.index()] = weight;
    }

    /// Non-zero entries in row-major order.
    pub fn couplings(&self) -> Vec<Coupling> {
        let mut out = Vec::new();
        for from in Dimension::ALL {
            for to in Dimension::ALL {
                let weight = self.get(from, to);
                if weight != 0.0 {
                    out.push(Coupling { from, to, weight });
                }
            }
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.weights.iter().all(|w| *w == 0.0)
    }
}

impl Default for InfluenceMatrix {
    /// A sparse set of couplings between opposing and reinforcing emotions.
    fn default() -> Self {
        use Dimension::*;
        let c = |from, to, weight| Coupling { from, to, weight };
        Self::from_couplings([
            c(Joy, Sadness, -0.04),
            c(Sadness, Joy, -0.04),
            c(Fear, Trust, -0.03),
            c(Trust, Fear, -0.02),
            c(Anger, Serenity, -0.03),
            c(Serenity, Anger, -0.02),
            c(Curiosity, Boredom, -0.03),
            c(Boredom, Curiosity, 0.01),
            c(Curiosity, Fascination, 0.02),
            c(Wonder, Curiosity, 0.02),
            c(Awe, Wonder, 0.02),
            c(Loneliness, Sadness, 0.02),
            c(Affection, Loneliness, -0.03),
            c(Gratitude, Joy, 0.02),
            c(Shame, Pride, -0.03),
            c(Confusion, Doubt, 0.02),
            c(Insight, Confusion, -0.03),
            c(Insight, Certainty, 0.02),
            c(Certainty, Doubt, -0.02),
        ])
    }
}

impl Serialize for InfluenceMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.couplings().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InfluenceMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let couplings = Vec::<Coupling>::deserialize(deserializer)?;
        Ok(Self::from_couplings(couplings))
    }
}

/// All physics parameters of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub decay: DecayRates,
    pub inertia: InertiaConfig,
    pub influence: InfluenceMatrix,
    /// Resting point the decay term pulls toward.
    pub baseline: EmotionalVector,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        use Dimension::*;
        let baseline = EmotionalVector::uniform(0.1)
            .with(Joy, 0.4)
            .with(Trust, 0.5)
            .with(Anticipation, 0.3)
            .with(Curiosity, 0.5)
            .with(Serenity, 0.4)
            .with(Affection, 0.3)
            .with(Empathy, 0.4)
            .with(Certainty, 0.3)
            .with(Focus, 0.4);
        Self {
            decay: DecayRates::default(),
            inertia: InertiaConfig::default(),
            influence: InfluenceMatrix::default(),
            baseline,
        }
    }
}

fn check_unit(name: &str, value: f32) -> Result<(), EngineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

impl PhysicsConfig {
    /// A config with an all-zero influence matrix (no cross-talk).
    pub fn without_influence() -> Self {
        Self {
            influence: InfluenceMatrix::zeros(),
            ..Self::default()
        }
    }

    pub fn with_baseline(mut self, baseline: EmotionalVector) -> Self {
        self.baseline = baseline;
        self
    }

    /// Reject configurations the tick could not run on.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_unit("decay.primary", self.decay.primary)?;
        check_unit("decay.aesthetic", self.decay.aesthetic)?;
        check_unit("decay.social", self.decay.social)?;
        check_unit("decay.cognitive", self.decay.cognitive)?;
        for (dim, rate) in &self.decay.overrides {
            check_unit(&format!("decay.overrides.{}", dim), *rate)?;
        }
        check_unit("inertia.default", self.inertia.default)?;
        for (dim, factor) in &self.inertia.overrides {
            check_unit(&format!("inertia.overrides.{}", dim), *factor)?;
        }
        for from in Dimension::ALL {
            for to in Dimension::ALL {
                let w = self.influence.get(from, to);
                if !w.is_finite() || w.abs() > 1.0 {
                    return Err(EngineError::InvalidConfig(format!(
                        "influence weight {} -> {} must be finite and within [-1, 1], got {}",
                        from, to, w
                    )));
                }
            }
        }
        for (dim, value) in self.baseline.iter() {
            check_unit(&format!("baseline.{}", dim), value)?;
        }
        Ok(())
    }
}
