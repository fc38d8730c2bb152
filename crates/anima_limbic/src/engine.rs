//! Core emotion engine implementation
//!
//! The EmotionEngine owns one 27-dimensional emotional vector. It:
//! - Queues influence events submitted from any thread
//! - Advances the vector on every tick (background heartbeat or manual)
//! - Publishes an immutable snapshot after each tick
//! - Persists itself periodically and drifts its baseline slowly

use crate::drift::DriftAccumulator;
use crate::heartbeat::HeartbeatConfig;
use crate::state::PersistedState;
use anima_core::dynamics::{tick_fraction, Dynamics, ResonanceDynamics};
use anima_core::{
    ActiveInfluence, EngineError, Fault, InfluenceEvent, PhysicsConfig, Snapshot, StateBlob,
    StateStore, VolatilityWindow,
};
use arc_swap::ArcSwap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// State only a ticker may touch.
struct TickState {
    tick: u64,
    vector: anima_core::EmotionalVector,
    active: Vec<ActiveInfluence>,
    pending: VecDeque<InfluenceEvent>,
    window: VolatilityWindow,
    drift: DriftAccumulator,
    influence_rx: mpsc::UnboundedReceiver<InfluenceEvent>,
}

impl TickState {
    /// Move everything submitted so far into the pending queue.
    fn drain_submissions(&mut self) {
        while let Ok(event) = self.influence_rx.try_recv() {
            self.pending.push_back(event);
        }
    }

    fn persisted(&self, physics: &PhysicsConfig) -> PersistedState {
        PersistedState {
            tick: self.tick,
            vector: self.vector,
            baseline: physics.baseline,
            active: self.active.clone(),
            pending: self.pending.iter().cloned().collect(),
            drift: self.drift.clone(),
        }
    }
}

/// The emotional state engine
pub struct EmotionEngine {
    /// Swapped wholesale by `configure` and by baseline drift.
    physics: ArcSwap<PhysicsConfig>,

    /// Latest snapshot; readers never wait on a tick.
    snapshot: ArcSwap<Snapshot>,

    /// Watch channel for snapshot updates
    snapshot_tx: watch::Sender<Arc<Snapshot>>,

    influence_tx: mpsc::UnboundedSender<InfluenceEvent>,

    /// Serialises ticks, export and import.
    state: Mutex<TickState>,

    dynamics: Box<dyn Dynamics>,

    heartbeat: HeartbeatConfig,

    store: Option<Arc<dyn StateStore>>,

    persistence_failures: AtomicU64,
}

impl EmotionEngine {
    /// Create an engine resting at the configured baseline.
    pub fn new(physics: PhysicsConfig, heartbeat: HeartbeatConfig) -> Result<Self, EngineError> {
        physics.validate()?;
        let (influence_tx, influence_rx) = mpsc::unbounded_channel();
        let vector = physics.baseline;
        let mut window = VolatilityWindow::new(heartbeat.window_size);
        window.push(vector);
        let initial = Arc::new(Snapshot::initial(vector));
        let (snapshot_tx, _) = watch::channel(Arc::clone(&initial));

        Ok(Self {
            physics: ArcSwap::from_pointee(physics),
            snapshot: ArcSwap::new(initial),
            snapshot_tx,
            influence_tx,
            state: Mutex::new(TickState {
                tick: 0,
                vector,
                active: Vec::new(),
                pending: VecDeque::new(),
                window,
                drift: DriftAccumulator::default(),
                influence_rx,
            }),
            dynamics: Box::new(ResonanceDynamics),
            heartbeat,
            store: None,
            persistence_failures: AtomicU64::new(0),
        })
    }

    /// Attach a state store for periodic saves and `restore`.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dynamics(mut self, dynamics: impl Dynamics + 'static) -> Self {
        self.dynamics = Box::new(dynamics);
        self
    }

    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    // ------------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------------

    /// Queue an influence event for the next tick. Never blocks and never
    /// touches the vector directly.
    pub fn submit_influence(&self, event: InfluenceEvent) -> Result<(), EngineError> {
        event.validate()?;
        tracing::trace!(
            source = %event.source,
            intensity = event.intensity,
            dimensions = event.deltas.len(),
            "Influence event queued"
        );
        if self.influence_tx.send(event).is_err() {
            // The receiver lives as long as the engine.
            tracing::error!("Influence queue closed, event discarded");
        }
        Ok(())
    }

    /// Replace the physics. The next tick uses the new values; on error the
    /// previous configuration stays in force.
    pub fn configure(&self, physics: PhysicsConfig) -> Result<(), EngineError> {
        if let Err(e) = physics.validate() {
            tracing::warn!("Rejected physics configuration: {}", e);
            return Err(e);
        }
        self.physics.store(Arc::new(physics));
        tracing::info!("Physics configuration updated");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn physics(&self) -> Arc<PhysicsConfig> {
        self.physics.load_full()
    }

    /// Number of saves that failed since start.
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advance the state by one tick and return the new snapshot.
    pub async fn tick(&self) -> Arc<Snapshot> {
        let (snapshot, save) = {
            let mut state = self.state.lock().await;
            let physics = self.physics.load_full();

            state.drain_submissions();
            let arrived: Vec<_> = state.pending.drain(..).map(ActiveInfluence::new).collect();
            state.active.extend(arrived);

            let fraction = tick_fraction(self.heartbeat.interval);
            let v0 = state.vector;
            let v1 = self.dynamics.step(&v0, &state.active, &physics, fraction);

            let interval = self.heartbeat.interval;
            for influence in state.active.iter_mut() {
                influence.ticks_applied = influence.ticks_applied.saturating_add(1);
            }
            state.active.retain(|a| !a.is_expired(interval));

            state.vector = v1;
            state.tick += 1;
            state.window.push(v1);
            let snapshot = Arc::new(Snapshot::new(state.tick, v1, state.window.volatility()));
            self.snapshot.store(Arc::clone(&snapshot));
            self.snapshot_tx.send_replace(Arc::clone(&snapshot));

            tracing::trace!(
                tick = state.tick,
                dominant = %snapshot.dominant.dimension,
                value = snapshot.dominant.value,
                volatility = snapshot.volatility,
                active = state.active.len(),
                "Tick"
            );

            state.drift.record(&v1);
            if state.drift.samples() >= self.heartbeat.drift_every_ticks {
                self.apply_drift(&mut state.drift);
            }

            let save = if state.tick % self.heartbeat.persist_every_ticks.max(1) == 0 {
                Some(state.persisted(&self.physics.load()))
            } else {
                None
            };
            (snapshot, save)
        };

        if let Some(persisted) = save {
            self.save(&persisted).await;
        }
        snapshot
    }

    fn apply_drift(&self, drift: &mut DriftAccumulator) {
        let max_drift = self.heartbeat.max_drift;
        self.physics.rcu(|current| {
            let mut next = PhysicsConfig::clone(current);
            next.baseline = drift.shifted(&current.baseline, max_drift);
            next
        });
        tracing::info!(samples = drift.samples(), max_drift, "Baseline drifted");
        drift.reset();
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub async fn export(&self) -> Result<StateBlob, EngineError> {
        let mut state = self.state.lock().await;
        state.drain_submissions();
        state.persisted(&self.physics.load()).encode()
    }

    /// Replace the whole state with a previously exported blob.
    pub async fn import(&self, blob: &StateBlob) -> Result<(), EngineError> {
        let restored = PersistedState::decode(blob)?;
        let mut state = self.state.lock().await;

        // Submissions made before the import stay queued behind the restored ones.
        state.drain_submissions();
        let mut pending: VecDeque<_> = restored.pending.into();
        pending.append(&mut state.pending);

        self.physics.rcu(|current| {
            let mut next = PhysicsConfig::clone(current);
            next.baseline = restored.baseline;
            next
        });

        state.tick = restored.tick;
        state.vector = restored.vector;
        state.active = restored.active;
        state.pending = pending;
        state.drift = restored.drift;
        state.window = VolatilityWindow::new(self.heartbeat.window_size);
        state.window.push(restored.vector);

        let snapshot = Arc::new(Snapshot::new(restored.tick, restored.vector, 0.0));
        self.snapshot.store(Arc::clone(&snapshot));
        self.snapshot_tx.send_replace(snapshot);
        tracing::info!(tick = restored.tick, "Engine state imported");
        Ok(())
    }

    async fn save(&self, persisted: &PersistedState) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        let result = match persisted.encode() {
            Ok(blob) => store.save(&self.heartbeat.instance_id, &blob).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => {
                tracing::debug!(tick = persisted.tick, "Engine state persisted");
                true
            }
            Err(e) => {
                self.persistence_failures.fetch_add(1, Ordering::Relaxed);
                let fault = Fault::PersistenceFailure {
                    reason: format!("{:#}", e),
                };
                tracing::warn!(tick = persisted.tick, "{}", fault);
                false
            }
        }
    }

    /// Save the current state now. Returns `false` if the store failed.
    pub async fn persist(&self) -> bool {
        let persisted = {
            let mut state = self.state.lock().await;
            state.drain_submissions();
            state.persisted(&self.physics.load())
        };
        self.save(&persisted).await
    }

    /// Load the saved state, if any. Anything that goes wrong leaves the
    /// engine at its baseline.
    pub async fn restore(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load(&self.heartbeat.instance_id).await {
            Ok(Some(blob)) => match self.import(&blob).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Saved engine state unusable, starting from baseline: {}", e);
                    false
                }
            },
            Ok(None) => {
                tracing::info!(instance = %self.heartbeat.instance_id, "No saved engine state, starting from baseline");
                false
            }
            Err(e) => {
                tracing::warn!("Failed to load engine state, starting from baseline: {:#}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Background heartbeat
    // ------------------------------------------------------------------------

    /// Spawn the background heartbeat task. Cancelling `token` stops it
    /// after a final save.
    pub fn spawn(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.heartbeat.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            tracing::info!(interval = ?engine.heartbeat.interval, "Emotion engine heartbeat started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        engine.tick().await;
                    }
                }
            }

            engine.persist().await;
            tracing::info!("Emotion engine heartbeat stopped");
        })
    }
}
