//! Meta-cognitive orchestration.
//!
//! A request goes through one pipeline: fan out to every signal provider
//! under deadlines, score attention, detect and resolve conflicts, draft a
//! recommendation, check it against continuity, then emit it on the bus.

pub mod attention;
pub mod coherence;
pub mod conflict;
pub mod fanout;
pub mod journal;
pub mod orchestrator;

pub use attention::{attention_score, select_tier};
pub use coherence::{divergence, CoherenceCheck, CoherenceVerdict};
pub use conflict::{detect_conflicts, fallback_order, precedence_pick, ConflictResolver};
pub use fanout::{FanOut, FanOutResult};
pub use journal::{DecisionJournal, LateSignalEntry};
pub use orchestrator::Orchestrator;
