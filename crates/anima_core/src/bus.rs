//! Two-lane message bus.
//!
//! The sync lane (`dispatch`) awaits every matching handler inline and hands
//! back their replies. The async lane (`post`) never blocks: messages go into
//! one of two bounded channels and a background dispatcher drains them,
//! urgent first. A full lane drops the message.

use crate::config::BusConfig;
use crate::decision::{DecisionRecord, Outcome};
use crate::signal::SignalEnvelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Decision,
    DecisionLog,
    LateSignal,
    DeepProcessingRequest,
    Acknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    #[default]
    Normal,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    Decision(Box<Outcome>),
    DecisionLog(Box<DecisionRecord>),
    /// A provider answered after its request had already been decided.
    LateSignal(Box<SignalEnvelope>),
    DeepProcessingRequest {
        request_id: Uuid,
        attention_score: f32,
        text: String,
    },
    Acknowledged { handler: String },
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Decision(_) => MessageKind::Decision,
            MessagePayload::DecisionLog(_) => MessageKind::DecisionLog,
            MessagePayload::LateSignal(_) => MessageKind::LateSignal,
            MessagePayload::DeepProcessingRequest { .. } => MessageKind::DeepProcessingRequest,
            MessagePayload::Acknowledged { .. } => MessageKind::Acknowledged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub priority: MessagePriority,
    pub payload: MessagePayload,
    /// Handler names to deliver to. Empty means every interested handler.
    pub targets: Vec<String>,
    pub correlation_id: Option<Uuid>,
    pub requires_response: bool,
}

impl MessageEnvelope {
    pub fn new(source: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            timestamp: Utc::now(),
            kind: payload.kind(),
            priority: MessagePriority::Normal,
            payload,
            targets: Vec::new(),
            correlation_id: None,
            requires_response: false,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn correlated_with(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn expecting_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    fn is_for(&self, handler: &dyn MessageHandler) -> bool {
        handler.accepts(self.kind)
            && (self.targets.is_empty() || self.targets.iter().any(|t| t == handler.name()))
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, kind: MessageKind) -> bool;

    /// Handle one message. A reply is only collected on the sync lane when
    /// the sender asked for one.
    async fn handle(&self, envelope: &MessageEnvelope) -> anyhow::Result<Option<MessagePayload>>;
}

/// What happened to one synchronously dispatched message.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub replies: Vec<(String, MessagePayload)>,
    pub failures: Vec<(String, String)>,
}

// ============================================================================
// MessageBus
// ============================================================================

type Lanes = (
    mpsc::Receiver<MessageEnvelope>,
    mpsc::Receiver<MessageEnvelope>,
);

pub struct MessageBus {
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    urgent_tx: mpsc::Sender<MessageEnvelope>,
    normal_tx: mpsc::Sender<MessageEnvelope>,
    /// Taken by the first `spawn_dispatcher` call.
    lanes: Mutex<Option<Lanes>>,
    dropped: AtomicU64,
}

impl MessageBus {
    pub fn new(config: &BusConfig) -> Self {
        let capacity = config.lane_capacity.max(1);
        let (urgent_tx, urgent_rx) = mpsc::channel(capacity);
        let (normal_tx, normal_rx) = mpsc::channel(capacity);
        Self {
            handlers: RwLock::new(Vec::new()),
            urgent_tx,
            normal_tx,
            lanes: Mutex::new(Some((urgent_rx, normal_rx))),
            dropped: AtomicU64::new(0),
        }
    }

    pub async fn subscribe(&self, handler: Arc<dyn MessageHandler>) {
        tracing::debug!(handler = handler.name(), "Bus handler registered");
        self.handlers.write().await.push(handler);
    }

    async fn matching(&self, envelope: &MessageEnvelope) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .await
            .iter()
            .filter(|h| envelope.is_for(h.as_ref()))
            .cloned()
            .collect()
    }

    /// Sync lane. Never fails: handler errors are logged and reported.
    pub async fn dispatch(&self, envelope: MessageEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        for handler in self.matching(&envelope).await {
            let name = handler.name().to_string();
            match handler.handle(&envelope).await {
                Ok(reply) => {
                    if envelope.requires_response {
                        if let Some(reply) = reply {
                            report.replies.push((name.clone(), reply));
                        }
                    }
                    report.delivered.push(name);
                }
                Err(e) => {
                    tracing::error!(handler = %name, kind = ?envelope.kind, "Bus handler failed: {:#}", e);
                    report.failures.push((name, format!("{:#}", e)));
                }
            }
        }
        if report.delivered.is_empty() && report.failures.is_empty() {
            tracing::trace!(kind = ?envelope.kind, "No handler for dispatched message");
        }
        report
    }

    /// Async lane. Returns `false` when the lane was full and the message
    /// was dropped.
    pub fn post(&self, envelope: MessageEnvelope) -> bool {
        let lane = match envelope.priority {
            MessagePriority::Urgent => &self.urgent_tx,
            MessagePriority::Normal => &self.normal_tx,
        };
        match lane.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = ?dropped.kind,
                    priority = ?dropped.priority,
                    "Async bus lane full, message dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = ?dropped.kind, "Async bus lane closed, message dropped");
                false
            }
        }
    }

    /// Number of async messages dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn deliver(&self, envelope: MessageEnvelope) {
        for handler in self.matching(&envelope).await {
            if let Err(e) = handler.handle(&envelope).await {
                tracing::error!(
                    handler = handler.name(),
                    kind = ?envelope.kind,
                    "Async bus handler failed: {:#}",
                    e
                );
            }
        }
    }

    /// Start the background dispatcher for the async lane. On cancellation
    /// whatever is already queued is delivered before the task exits.
    pub fn spawn_dispatcher(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let lanes = self.lanes.lock().ok().and_then(|mut guard| guard.take());
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let Some((mut urgent_rx, mut normal_rx)) = lanes else {
                tracing::warn!("Bus dispatcher already running, not starting another");
                return;
            };
            tracing::info!("Bus dispatcher started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    Some(msg) = urgent_rx.recv() => bus.deliver(msg).await,
                    Some(msg) = normal_rx.recv() => bus.deliver(msg).await,
                }
            }
            while let Ok(msg) = urgent_rx.try_recv() {
                bus.deliver(msg).await;
            }
            while let Ok(msg) = normal_rx.try_recv() {
                bus.deliver(msg).await;
            }
            tracing::info!("Bus dispatcher stopped");
        })
    }
}
