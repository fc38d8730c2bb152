//! Async-lane handler that writes decisions and late signals to SQLite.

use crate::sqlite::SqliteStore;
use anima_core::{MessageEnvelope, MessageHandler, MessageKind, MessagePayload};
use async_trait::async_trait;
use std::sync::Arc;

pub struct SqliteDecisionJournal {
    store: Arc<SqliteStore>,
}

impl SqliteDecisionJournal {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for SqliteDecisionJournal {
    fn name(&self) -> &str {
        "sqlite_journal"
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(kind, MessageKind::DecisionLog | MessageKind::LateSignal)
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> anyhow::Result<Option<MessagePayload>> {
        match &envelope.payload {
            MessagePayload::DecisionLog(record) => {
                self.store.record_decision(record).await?;
            }
            MessagePayload::LateSignal(signal) => {
                tracing::debug!(
                    provider = %signal.provider,
                    request_id = ?envelope.correlation_id,
                    "Late signal journaled"
                );
                self.store
                    .record_late_signal(signal, envelope.correlation_id)
                    .await?;
            }
            other => {
                tracing::trace!(kind = ?other.kind(), "Journal ignoring message");
                return Ok(None);
            }
        }
        Ok(Some(MessagePayload::Acknowledged {
            handler: self.name().to_string(),
        }))
    }
}
