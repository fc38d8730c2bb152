//! Heartbeat configuration for the emotion engine
//!
//! The heartbeat determines how often the state is advanced even when no
//! influence arrives, and how often the engine persists and drifts.

use anima_core::config::EngineSettings;
use std::time::Duration;

/// Configuration for the engine heartbeat
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// Key the state is persisted under.
    pub instance_id: String,
    /// How often to tick (default: 5s, the reference cadence)
    pub interval: Duration,
    /// Snapshots kept for volatility.
    pub window_size: usize,
    pub persist_every_ticks: u64,
    pub drift_every_ticks: u64,
    pub max_drift: f32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for HeartbeatConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            instance_id: settings.instance_id.clone(),
            interval: settings.tick_interval(),
            window_size: settings.window_size,
            persist_every_ticks: settings.persist_every_ticks(),
            drift_every_ticks: settings.drift_every_ticks(),
            max_drift: settings.max_drift,
        }
    }
}

impl HeartbeatConfig {
    /// Clamped to at least 1ms, like `EngineSettings::tick_interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Persist on every tick. Handy for tests.
    pub fn persist_each_tick(mut self) -> Self {
        self.persist_every_ticks = 1;
        self
    }

    pub fn with_drift(mut self, every_ticks: u64, max_drift: f32) -> Self {
        self.drift_every_ticks = every_ticks.max(1);
        self.max_drift = max_drift;
        self
    }
}
