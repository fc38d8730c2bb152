//! Signal envelopes and the provider contracts the orchestrator consumes.
//!
//! Providers are opaque collaborators (identity, goals, learning, the emotion
//! engine itself...). Each one answers a request with a [`SignalEnvelope`]
//! carrying a recommended [`ActionTag`], a confidence and a salience.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Source categories
// ============================================================================

/// Closed set of signal source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceCategory {
    Safety,
    Identity,
    Goal,
    Emotional,
    Learning,
    Reflection,
    Memory,
}

impl SourceCategory {
    pub const COUNT: usize = 7;

    pub const ALL: [SourceCategory; Self::COUNT] = [
        SourceCategory::Safety,
        SourceCategory::Identity,
        SourceCategory::Goal,
        SourceCategory::Emotional,
        SourceCategory::Learning,
        SourceCategory::Reflection,
        SourceCategory::Memory,
    ];

    pub fn index(self) -> usize {
        match self {
            SourceCategory::Safety => 0,
            SourceCategory::Identity => 1,
            SourceCategory::Goal => 2,
            SourceCategory::Emotional => 3,
            SourceCategory::Learning => 4,
            SourceCategory::Reflection => 5,
            SourceCategory::Memory => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceCategory::Safety => "safety",
            SourceCategory::Identity => "identity",
            SourceCategory::Goal => "goal",
            SourceCategory::Emotional => "emotional",
            SourceCategory::Learning => "learning",
            SourceCategory::Reflection => "reflection",
            SourceCategory::Memory => "memory",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| format!("unknown source category `{}`", s))
    }
}

// Plain strings, so categories work as TOML table keys.
impl Serialize for SourceCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// A value for every [`SourceCategory`]. Lookups can never miss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryTable<T> {
    entries: [T; SourceCategory::COUNT],
}

impl<T: Copy> CategoryTable<T> {
    pub fn from_fn(f: impl Fn(SourceCategory) -> T) -> Self {
        Self {
            entries: SourceCategory::ALL.map(f),
        }
    }

    pub fn get(&self, category: SourceCategory) -> T {
        self.entries[category.index()]
    }

    pub fn set(&mut self, category: SourceCategory, value: T) {
        self.entries[category.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceCategory, T)> + '_ {
        SourceCategory::ALL.iter().map(move |c| (*c, self.entries[c.index()]))
    }
}

/// Precedence of each category when conflicting recommendations must be
/// settled. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SourceCategory, f32>", into = "BTreeMap<SourceCategory, f32>")]
pub struct PriorityTable(CategoryTable<f32>);

impl PriorityTable {
    pub fn precedence(&self, category: SourceCategory) -> f32 {
        self.0.get(category)
    }

    pub fn with(mut self, category: SourceCategory, precedence: f32) -> Self {
        self.0.set(category, precedence);
        self
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self(CategoryTable::from_fn(|c| match c {
            SourceCategory::Safety => 1.0,
            SourceCategory::Identity => 0.8,
            SourceCategory::Goal => 0.7,
            SourceCategory::Emotional => 0.6,
            SourceCategory::Reflection => 0.5,
            SourceCategory::Learning => 0.4,
            SourceCategory::Memory => 0.3,
        }))
    }
}

/// Configured entries override the built-in precedence; the rest keep it.
impl From<BTreeMap<SourceCategory, f32>> for PriorityTable {
    fn from(map: BTreeMap<SourceCategory, f32>) -> Self {
        let mut table = Self::default();
        for (category, precedence) in map {
            table.0.set(category, precedence);
        }
        table
    }
}

impl From<PriorityTable> for BTreeMap<SourceCategory, f32> {
    fn from(table: PriorityTable) -> Self {
        table.0.iter().collect()
    }
}

/// Attention weight per category. Categories without a weight fall back to
/// the orchestrator's minimum weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SourceCategory, f32>", into = "BTreeMap<SourceCategory, f32>")]
pub struct AttentionWeights(CategoryTable<Option<f32>>);

impl AttentionWeights {
    pub fn weight(&self, category: SourceCategory, min_weight: f32) -> f32 {
        self.0.get(category).unwrap_or(min_weight)
    }

    pub fn with(mut self, category: SourceCategory, weight: f32) -> Self {
        self.0.set(category, Some(weight));
        self
    }

    pub fn without(mut self, category: SourceCategory) -> Self {
        self.0.set(category, None);
        self
    }
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self(CategoryTable::from_fn(|c| match c {
            SourceCategory::Safety => Some(1.0),
            SourceCategory::Identity => Some(0.6),
            SourceCategory::Goal => Some(0.7),
            SourceCategory::Emotional => Some(0.8),
            SourceCategory::Reflection => Some(0.4),
            SourceCategory::Learning => Some(0.3),
            SourceCategory::Memory => None,
        }))
    }
}

impl From<BTreeMap<SourceCategory, f32>> for AttentionWeights {
    fn from(map: BTreeMap<SourceCategory, f32>) -> Self {
        let mut table = CategoryTable::from_fn(|_| None);
        for (category, weight) in map {
            table.set(category, Some(weight));
        }
        Self(table)
    }
}

impl From<AttentionWeights> for BTreeMap<SourceCategory, f32> {
    fn from(weights: AttentionWeights) -> Self {
        weights
            .0
            .iter()
            .filter_map(|(c, w)| w.map(|w| (c, w)))
            .collect()
    }
}

// ============================================================================
// Actions
// ============================================================================

/// How strongly two actions contradict each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusivity {
    Compatible,
    /// Contradictory, but a middle ground may preserve both intents.
    Soft,
    /// No middle ground exists.
    Strict,
}

/// Recommended course of action, ordered by engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    Decline,
    Defer,
    Clarify,
    ProceedWithCaution,
    Proceed,
    Explore,
}

const C: Exclusivity = Exclusivity::Compatible;
const S: Exclusivity = Exclusivity::Soft;
const X: Exclusivity = Exclusivity::Strict;

/// Symmetric, indexed in [`ActionTag::ALL`] order.
const EXCLUSIVITY: [[Exclusivity; 6]; 6] = [
    // Decline Defer Clarify PwC Proceed Explore
    [C, C, S, X, X, X], // Decline
    [C, C, C, C, S, S], // Defer
    [S, C, C, C, S, S], // Clarify
    [X, C, C, C, C, C], // ProceedWithCaution
    [X, S, S, C, C, C], // Proceed
    [X, S, S, C, C, C], // Explore
];

impl ActionTag {
    pub const ALL: [ActionTag; 6] = [
        ActionTag::Decline,
        ActionTag::Defer,
        ActionTag::Clarify,
        ActionTag::ProceedWithCaution,
        ActionTag::Proceed,
        ActionTag::Explore,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Position on the engagement axis, `[0, 1]`.
    pub fn engagement(self) -> f32 {
        match self {
            ActionTag::Decline => 0.0,
            ActionTag::Defer => 0.2,
            ActionTag::Clarify => 0.4,
            ActionTag::ProceedWithCaution => 0.6,
            ActionTag::Proceed => 0.8,
            ActionTag::Explore => 1.0,
        }
    }

    pub fn exclusivity(self, other: ActionTag) -> Exclusivity {
        EXCLUSIVITY[self.index()][other.index()]
    }

    pub fn is_compatible_with(self, other: ActionTag) -> bool {
        self.exclusivity(other) == Exclusivity::Compatible
    }

    /// The allowed tag closest to `position`. Ties go to the less engaged tag.
    pub fn nearest(position: f32, allowed: impl Fn(ActionTag) -> bool) -> Option<ActionTag> {
        let mut best: Option<(ActionTag, f32)> = None;
        for tag in Self::ALL {
            if !allowed(tag) {
                continue;
            }
            let distance = (tag.engagement() - position).abs();
            match best {
                Some((_, d)) if distance >= d - 1e-4 => {}
                _ => best = Some((tag, distance)),
            }
        }
        best.map(|(tag, _)| tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionTag::Decline => "decline",
            ActionTag::Defer => "defer",
            ActionTag::Clarify => "clarify",
            ActionTag::ProceedWithCaution => "proceed_with_caution",
            ActionTag::Proceed => "proceed",
            ActionTag::Explore => "explore",
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action plus an opaque, provider-defined payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: ActionTag,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Recommendation {
    pub fn new(action: ActionTag) -> Self {
        Self {
            action,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// One provider's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub id: Uuid,
    /// Name of the provider that produced it.
    pub provider: String,
    pub category: SourceCategory,
    pub timestamp: DateTime<Utc>,
    pub recommendation: Recommendation,
    /// `[0, 1]`
    pub confidence: f32,
    /// `[0, 1]`
    pub salience: f32,
    pub rationale: String,
}

fn unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl SignalEnvelope {
    pub fn new(
        provider: impl Into<String>,
        category: SourceCategory,
        recommendation: Recommendation,
        confidence: f32,
        salience: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            category,
            timestamp: Utc::now(),
            recommendation,
            confidence: unit(confidence),
            salience: unit(salience),
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn action(&self) -> ActionTag {
        self.recommendation.action
    }
}

/// What the orchestrator was asked to decide on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            attributes: serde_json::Map::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Time limit and cancellation signal handed to a provider call.
#[derive(Debug, Clone)]
pub struct Deadline {
    pub at: Instant,
    pub token: CancellationToken,
}

impl Deadline {
    pub fn new(at: Instant, token: CancellationToken) -> Self {
        Self { at, token }
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// Provider contracts
// ============================================================================

#[async_trait]
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> SourceCategory;

    /// Produce a signal for `ctx`. The caller enforces `deadline`; providers
    /// may watch `deadline.token` to stop work early.
    async fn get_signal(
        &self,
        ctx: &RequestContext,
        deadline: Deadline,
    ) -> anyhow::Result<SignalEnvelope>;
}

/// What continuity (identity / recent history) expects for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityReference {
    pub action: ActionTag,
    pub confidence: f32,
    pub rationale: String,
}

#[async_trait]
pub trait ContinuityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn reference(
        &self,
        ctx: &RequestContext,
        deadline: Deadline,
    ) -> anyhow::Result<ContinuityReference>;
}
