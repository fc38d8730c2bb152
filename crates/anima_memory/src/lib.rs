pub mod continuity;
pub mod journal;
pub mod sqlite;

pub use continuity::JournalContinuity;
pub use journal::SqliteDecisionJournal;
pub use sqlite::{DecisionSummary, SqliteStore};
