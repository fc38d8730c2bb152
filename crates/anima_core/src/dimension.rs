//! Emotional dimensions and the 27-dimensional state vector.
//!
//! The vector is split into 9 *primary* emotions and 18 *secondary* ones
//! (aesthetic, social, cognitive). Every value lives in `[0.0, 1.0]`; the
//! vector is a fixed array so no dimension can ever be missing.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of dimensions in an [`EmotionalVector`].
pub const DIMENSION_COUNT: usize = 27;

/// Guard against NaN and Infinity in state values.
/// Non-finite values are replaced with `fallback`, then clamped to `[0, 1]`.
#[inline]
pub(crate) fn sanitize_unit(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        tracing::warn!("NaN/Inf detected in emotional state, resetting to {}", fallback);
        fallback.clamp(0.0, 1.0)
    }
}

/// Which family a dimension belongs to. Decay defaults are set per partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Primary,
    Aesthetic,
    Social,
    Cognitive,
}

/// One named axis of the emotional state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    // Primary
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Trust,
    Anticipation,
    Curiosity,
    // Aesthetic
    Awe,
    Wonder,
    Nostalgia,
    Serenity,
    Elevation,
    Fascination,
    // Social
    Affection,
    Empathy,
    Gratitude,
    Loneliness,
    Pride,
    Shame,
    // Cognitive
    Confusion,
    Certainty,
    Focus,
    Insight,
    Doubt,
    Boredom,
}

impl Dimension {
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Joy,
        Dimension::Sadness,
        Dimension::Anger,
        Dimension::Fear,
        Dimension::Surprise,
        Dimension::Disgust,
        Dimension::Trust,
        Dimension::Anticipation,
        Dimension::Curiosity,
        Dimension::Awe,
        Dimension::Wonder,
        Dimension::Nostalgia,
        Dimension::Serenity,
        Dimension::Elevation,
        Dimension::Fascination,
        Dimension::Affection,
        Dimension::Empathy,
        Dimension::Gratitude,
        Dimension::Loneliness,
        Dimension::Pride,
        Dimension::Shame,
        Dimension::Confusion,
        Dimension::Certainty,
        Dimension::Focus,
        Dimension::Insight,
        Dimension::Doubt,
        Dimension::Boredom,
    ];

    /// Position of this dimension inside an [`EmotionalVector`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn partition(self) -> Partition {
        match self.index() {
            0..=8 => Partition::Primary,
            9..=14 => Partition::Aesthetic,
            15..=20 => Partition::Social,
            _ => Partition::Cognitive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Joy => "joy",
            Dimension::Sadness => "sadness",
            Dimension::Anger => "anger",
            Dimension::Fear => "fear",
            Dimension::Surprise => "surprise",
            Dimension::Disgust => "disgust",
            Dimension::Trust => "trust",
            Dimension::Anticipation => "anticipation",
            Dimension::Curiosity => "curiosity",
            Dimension::Awe => "awe",
            Dimension::Wonder => "wonder",
            Dimension::Nostalgia => "nostalgia",
            Dimension::Serenity => "serenity",
            Dimension::Elevation => "elevation",
            Dimension::Fascination => "fascination",
            Dimension::Affection => "affection",
            Dimension::Empathy => "empathy",
            Dimension::Gratitude => "gratitude",
            Dimension::Loneliness => "loneliness",
            Dimension::Pride => "pride",
            Dimension::Shame => "shame",
            Dimension::Confusion => "confusion",
            Dimension::Certainty => "certainty",
            Dimension::Focus => "focus",
            Dimension::Insight => "insight",
            Dimension::Doubt => "doubt",
            Dimension::Boredom => "boredom",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name does not match any dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDimension(pub String);

impl fmt::Display for UnknownDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotional dimension `{}`", self.0)
    }
}

impl std::error::Error for UnknownDimension {}

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| UnknownDimension(s.to_string()))
    }
}

// Dimensions are (de)serialized as plain strings so they can be used as map
// keys in both JSON and TOML.
impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// A named reading of one dimension, e.g. the dominant emotion of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionReading {
    pub dimension: Dimension,
    pub value: f32,
}

/// The full 27-dimensional emotional state. Every field is always in `[0, 1]`.
#[derive(Clone, Copy, PartialEq)]
pub struct EmotionalVector {
    values: [f32; DIMENSION_COUNT],
}

impl Default for EmotionalVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl fmt::Debug for EmotionalVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter().map(|(d, v)| (d.as_str(), v))).finish()
    }
}

impl EmotionalVector {
    pub fn zeros() -> Self {
        Self {
            values: [0.0; DIMENSION_COUNT],
        }
    }

    /// Every dimension set to the same value (clamped).
    pub fn uniform(value: f32) -> Self {
        Self {
            values: [sanitize_unit(value, 0.0); DIMENSION_COUNT],
        }
    }

    /// Build from `(dimension, value)` pairs; unspecified dimensions are 0.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Dimension, f32)>,
    {
        let mut v = Self::zeros();
        for (dim, value) in pairs {
            v.set(dim, value);
        }
        v
    }

    #[inline]
    pub fn get(&self, dim: Dimension) -> f32 {
        self.values[dim.index()]
    }

    /// Set a dimension, clamping into `[0, 1]`. NaN/Inf become 0.
    #[inline]
    pub fn set(&mut self, dim: Dimension, value: f32) {
        self.values[dim.index()] = sanitize_unit(value, 0.0);
    }

    /// Set a dimension, replacing a non-finite value with `fallback`.
    #[inline]
    pub fn set_or(&mut self, dim: Dimension, value: f32, fallback: f32) {
        self.values[dim.index()] = sanitize_unit(value, fallback);
    }

    pub fn with(mut self, dim: Dimension, value: f32) -> Self {
        self.set(dim, value);
        self
    }

    pub fn as_array(&self) -> &[f32; DIMENSION_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f32)> + '_ {
        Dimension::ALL.iter().map(move |d| (*d, self.values[d.index()]))
    }

    /// Highest and second-highest dimensions. Ties go to the lower index.
    pub fn top_two(&self) -> (DimensionReading, DimensionReading) {
        let mut first = DimensionReading {
            dimension: Dimension::ALL[0],
            value: self.values[0],
        };
        let mut second = DimensionReading {
            dimension: Dimension::ALL[1],
            value: self.values[1],
        };
        if second.value > first.value {
            std::mem::swap(&mut first, &mut second);
        }
        for (dim, value) in self.iter().skip(2) {
            if value > first.value {
                second = first;
                first = DimensionReading { dimension: dim, value };
            } else if value > second.value {
                second = DimensionReading { dimension: dim, value };
            }
        }
        (first, second)
    }

    /// Mean absolute difference to another vector.
    pub fn mean_abs_diff(&self, other: &EmotionalVector) -> f32 {
        let sum: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        sum / DIMENSION_COUNT as f32
    }
}

impl Serialize for EmotionalVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(DIMENSION_COUNT))?;
        for (dim, value) in self.iter() {
            map.serialize_entry(dim.as_str(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EmotionalVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VectorVisitor;

        impl<'de> Visitor<'de> for VectorVisitor {
            type Value = EmotionalVector;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of emotional dimension names to values in [0, 1]")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vector = EmotionalVector::zeros();
                while let Some((dim, value)) = access.next_entry::<Dimension, f32>()? {
                    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                        return Err(de::Error::custom(format!(
                            "value {} for `{}` is outside [0, 1]",
                            value, dim
                        )));
                    }
                    vector.values[dim.index()] = value;
                }
                Ok(vector)
            }
        }

        deserializer.deserialize_map(VectorVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_have_expected_sizes() {
        let count = |p: Partition| Dimension::ALL.iter().filter(|d| d.partition() == p).count();
        assert_eq!(count(Partition::Primary), 9);
        assert_eq!(count(Partition::Aesthetic), 6);
        assert_eq!(count(Partition::Social), 6);
        assert_eq!(count(Partition::Cognitive), 6);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, d) in Dimension::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("curiosity".parse::<Dimension>().unwrap(), Dimension::Curiosity);
        assert_eq!(" Joy ".parse::<Dimension>().unwrap(), Dimension::Joy);
        assert!("happiness".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_set_clamps_and_sanitizes() {
        let mut v = EmotionalVector::zeros();
        v.set(Dimension::Joy, 1.7);
        v.set(Dimension::Fear, -0.3);
        v.set(Dimension::Awe, f32::NAN);
        v.set_or(Dimension::Trust, f32::INFINITY, 0.5);
        assert_eq!(v.get(Dimension::Joy), 1.0);
        assert_eq!(v.get(Dimension::Fear), 0.0);
        assert_eq!(v.get(Dimension::Awe), 0.0);
        assert_eq!(v.get(Dimension::Trust), 0.5);
    }

    #[test]
    fn test_top_two_prefers_lower_index_on_tie() {
        let v = EmotionalVector::zeros()
            .with(Dimension::Curiosity, 0.6)
            .with(Dimension::Joy, 0.6)
            .with(Dimension::Awe, 0.3);
        let (first, second) = v.top_two();
        assert_eq!(first.dimension, Dimension::Joy);
        assert_eq!(second.dimension, Dimension::Curiosity);
    }

    #[test]
    fn test_json_uses_dimension_names() {
        let v = EmotionalVector::zeros().with(Dimension::Curiosity, 0.25);
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["curiosity"], 0.25);
        assert_eq!(json.as_object().unwrap().len(), DIMENSION_COUNT);

        let back: EmotionalVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        let unknown = serde_json::json!({ "happiness": 0.5 });
        assert!(serde_json::from_value::<EmotionalVector>(unknown).is_err());

        let out_of_range = serde_json::json!({ "joy": 1.5 });
        assert!(serde_json::from_value::<EmotionalVector>(out_of_range).is_err());

        let partial = serde_json::json!({ "joy": 0.4 });
        let v: EmotionalVector = serde_json::from_value(partial).unwrap();
        assert_eq!(v.get(Dimension::Joy), 0.4);
        assert_eq!(v.get(Dimension::Sadness), 0.0);
    }
}
