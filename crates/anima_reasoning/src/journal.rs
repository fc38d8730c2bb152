//! Bounded in-memory decision journal.
//!
//! Subscribed to the bus like any other handler. Keeps the most recent
//! decision records, late signals and deep-processing requests so they can
//! be inspected without a database.

use anima_core::{
    DecisionRecord, MessageEnvelope, MessageHandler, MessageKind, MessagePayload, SignalEnvelope,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct LateSignalEntry {
    pub request_id: Option<Uuid>,
    pub envelope: SignalEnvelope,
}

#[derive(Default)]
struct Entries {
    decisions: VecDeque<DecisionRecord>,
    late: VecDeque<LateSignalEntry>,
    deep_requests: VecDeque<Uuid>,
}

pub struct DecisionJournal {
    capacity: usize,
    entries: RwLock<Entries>,
}

impl DecisionJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(Entries::default()),
        }
    }

    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.entries.read().await.decisions.iter().cloned().collect()
    }

    pub async fn find(&self, request_id: Uuid) -> Option<DecisionRecord> {
        self.entries
            .read()
            .await
            .decisions
            .iter()
            .find(|r| r.outcome.request_id == request_id)
            .cloned()
    }

    pub async fn late_signals(&self) -> Vec<LateSignalEntry> {
        self.entries.read().await.late.iter().cloned().collect()
    }

    pub async fn deep_requests(&self) -> Vec<Uuid> {
        self.entries.read().await.deep_requests.iter().copied().collect()
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

#[async_trait]
impl MessageHandler for DecisionJournal {
    fn name(&self) -> &str {
        "decision_journal"
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::DecisionLog | MessageKind::LateSignal | MessageKind::DeepProcessingRequest
        )
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> anyhow::Result<Option<MessagePayload>> {
        let mut entries = self.entries.write().await;
        match &envelope.payload {
            MessagePayload::DecisionLog(record) => {
                push_bounded(&mut entries.decisions, (**record).clone(), self.capacity);
            }
            MessagePayload::LateSignal(signal) => push_bounded(
                &mut entries.late,
                LateSignalEntry {
                    request_id: envelope.correlation_id,
                    envelope: (**signal).clone(),
                },
                self.capacity,
            ),
            MessagePayload::DeepProcessingRequest { request_id, .. } => {
                push_bounded(&mut entries.deep_requests, *request_id, self.capacity);
            }
            _ => return Ok(None),
        }
        Ok(Some(MessagePayload::Acknowledged {
            handler: self.name().to_string(),
        }))
    }
}
