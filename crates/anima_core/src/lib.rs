//! Core types shared by every anima crate.

pub mod bus;
pub mod config;
pub mod decision;
pub mod dimension;
pub mod dynamics;
pub mod error;
pub mod influence;
pub mod persistence;
pub mod physics;
pub mod signal;
pub mod snapshot;

pub use bus::{
    DispatchReport, MessageBus, MessageEnvelope, MessageHandler, MessageKind, MessagePayload,
    MessagePriority,
};
pub use config::{AnimaConfig, BusConfig, EngineSettings, OrchestratorConfig, StorageConfig};
pub use decision::{
    ConflictRecord, DecisionRecord, Outcome, RequestPhase, ResolutionOutcome, ResolutionStrategy,
    Tier,
};
pub use dimension::{Dimension, DimensionReading, EmotionalVector, Partition, DIMENSION_COUNT};
pub use dynamics::{Dynamics, ResonanceDynamics};
pub use error::{EngineError, Fault};
pub use influence::{ActiveInfluence, InfluenceEvent};
pub use persistence::{InMemoryStateStore, StateBlob, StateStore};
pub use physics::{Coupling, DecayRates, InertiaConfig, InfluenceMatrix, PhysicsConfig};
pub use signal::{
    ActionTag, AttentionWeights, CategoryTable, ContinuityProvider, ContinuityReference, Deadline,
    Exclusivity, PriorityTable, Recommendation, RequestContext, SignalEnvelope, SignalProvider,
    SourceCategory,
};
pub use snapshot::{Snapshot, VolatilityWindow};
