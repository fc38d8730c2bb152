use crate::physics::PhysicsConfig;
use crate::signal::{AttentionWeights, PriorityTable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimaConfig {
    pub engine: EngineSettings,
    pub physics: PhysicsConfig,
    pub orchestrator: OrchestratorConfig,
    pub bus: BusConfig,
    pub storage: StorageConfig,
}

impl AnimaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AnimaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ANIMA_INSTANCE_ID") {
            self.engine.instance_id = v;
        }
        if let Ok(v) = std::env::var("ANIMA_TICK_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.engine.tick_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("ANIMA_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("ANIMA_PROVIDER_DEADLINE_MS") {
            if let Ok(n) = v.parse() {
                self.orchestrator.provider_deadline_ms = n;
            }
        }
        if let Ok(v) = std::env::var("ANIMA_AGGREGATE_DEADLINE_MS") {
            if let Ok(n) = v.parse() {
                self.orchestrator.aggregate_deadline_ms = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Key the engine state is persisted under.
    pub instance_id: String,
    pub tick_interval_ms: u64,
    /// Snapshots kept for volatility.
    pub window_size: usize,
    pub persist_interval_secs: u64,
    /// Simulated time between baseline drift steps. Default: 7 days.
    pub drift_period_secs: u64,
    /// Largest per-dimension baseline shift per drift step.
    pub max_drift: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            instance_id: "default".to_string(),
            tick_interval_ms: 5_000,
            window_size: crate::snapshot::DEFAULT_WINDOW,
            persist_interval_secs: 60,
            drift_period_secs: 7 * 24 * 3600,
            max_drift: 0.05,
        }
    }
}

/// Number of whole ticks covering `period` at `tick`, at least one.
fn ticks_per(period: Duration, tick: Duration) -> u64 {
    let tick_ms = tick.as_millis().max(1);
    let n = period.as_millis().div_ceil(tick_ms);
    u64::try_from(n).unwrap_or(u64::MAX).max(1)
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn persist_every_ticks(&self) -> u64 {
        ticks_per(Duration::from_secs(self.persist_interval_secs), self.tick_interval())
    }

    pub fn drift_every_ticks(&self) -> u64 {
        ticks_per(Duration::from_secs(self.drift_period_secs), self.tick_interval())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub provider_deadline_ms: u64,
    pub aggregate_deadline_ms: u64,
    /// Weight for categories missing from `attention_weights`.
    pub min_weight: f32,
    pub fast_threshold: f32,
    pub deep_threshold: f32,
    /// Both confidences must exceed this for a contradiction to count.
    pub materiality: f32,
    pub synthesis_max_iterations: u32,
    pub synthesis_tolerance: f32,
    pub coherence_threshold: f32,
    pub coherence_max_retries: u32,
    pub continuity_amplification: f32,
    pub precedence: PriorityTable,
    pub attention_weights: AttentionWeights,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_deadline_ms: 100,
            aggregate_deadline_ms: 150,
            min_weight: 0.1,
            fast_threshold: 0.5,
            deep_threshold: 1.5,
            materiality: 0.4,
            synthesis_max_iterations: 5,
            synthesis_tolerance: 0.15,
            coherence_threshold: 0.4,
            coherence_max_retries: 1,
            continuity_amplification: 0.6,
            precedence: PriorityTable::default(),
            attention_weights: AttentionWeights::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn provider_deadline(&self) -> Duration {
        Duration::from_millis(self.provider_deadline_ms)
    }

    pub fn aggregate_deadline(&self) -> Duration {
        Duration::from_millis(self.aggregate_deadline_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of each async lane.
    pub lane_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { lane_capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Decisions kept by the in-memory journal.
    pub journal_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "anima.db".to_string(),
            journal_capacity: 512,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
