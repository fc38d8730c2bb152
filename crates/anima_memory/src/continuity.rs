//! Continuity reference drawn from the most recent journaled decision.

use crate::sqlite::SqliteStore;
use anima_core::{ActionTag, ContinuityProvider, ContinuityReference, Deadline, RequestContext};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

/// Expects the next decision to stay close to the last one.
pub struct JournalContinuity {
    store: Arc<SqliteStore>,
}

impl JournalContinuity {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContinuityProvider for JournalContinuity {
    fn name(&self) -> &str {
        "journal_continuity"
    }

    async fn reference(
        &self,
        _ctx: &RequestContext,
        _deadline: Deadline,
    ) -> anyhow::Result<ContinuityReference> {
        let last = self
            .store
            .recent_decisions(1)
            .await?
            .into_iter()
            .next()
            .context("No decision history yet")?;
        let action: ActionTag = serde_json::from_value(serde_json::Value::String(last.action.clone()))
            .with_context(|| format!("Unknown action `{}` in journal", last.action))?;
        Ok(ContinuityReference {
            action,
            confidence: last.confidence,
            rationale: format!("last decision was {}", last.action),
        })
    }
}
