//! End-to-end tests of the orchestration pipeline.
//!
//! Providers here are scripted; time is paused so deadline behaviour is
//! deterministic.

use anima_core::{
    ActionTag, BusConfig, ContinuityProvider, ContinuityReference, Deadline, Fault, MessageBus,
    MessageEnvelope, MessageHandler, MessageKind, MessagePayload, MessagePriority,
    OrchestratorConfig, Recommendation, RequestContext, RequestPhase, ResolutionStrategy,
    SignalEnvelope, SignalProvider, SourceCategory, Tier,
};
use anima_reasoning::{DecisionJournal, Orchestrator};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Scripted {
    name: &'static str,
    category: SourceCategory,
    action: ActionTag,
    confidence: f32,
    salience: f32,
    delay: Option<Duration>,
}

impl Scripted {
    fn new(name: &'static str, category: SourceCategory, action: ActionTag, confidence: f32) -> Self {
        Self {
            name,
            category,
            action,
            confidence,
            salience: 0.3,
            delay: None,
        }
    }

    fn salience(mut self, salience: f32) -> Self {
        self.salience = salience;
        self
    }

    fn hung(mut self) -> Self {
        self.delay = Some(Duration::from_secs(3600));
        self
    }
}

#[async_trait]
impl SignalProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn get_signal(&self, _ctx: &RequestContext, _deadline: Deadline) -> anyhow::Result<SignalEnvelope> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(SignalEnvelope::new(
            self.name,
            self.category,
            Recommendation::new(self.action),
            self.confidence,
            self.salience,
        ))
    }
}

struct Continuity {
    action: ActionTag,
    fail: bool,
}

#[async_trait]
impl ContinuityProvider for Continuity {
    fn name(&self) -> &str {
        "continuity"
    }

    async fn reference(&self, _ctx: &RequestContext, _deadline: Deadline) -> anyhow::Result<ContinuityReference> {
        if self.fail {
            anyhow::bail!("history unavailable");
        }
        Ok(ContinuityReference {
            action: self.action,
            confidence: 0.9,
            rationale: "recent conversation was cautious".to_string(),
        })
    }
}

/// Records what arrives on the sync lane.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(MessageKind, MessagePriority)>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        kind == MessageKind::Decision
    }

    async fn handle(&self, envelope: &MessageEnvelope) -> anyhow::Result<Option<MessagePayload>> {
        self.seen.lock().unwrap().push((envelope.kind, envelope.priority));
        Ok(None)
    }
}

fn bus() -> Arc<MessageBus> {
    Arc::new(MessageBus::new(&BusConfig::default()))
}

fn orchestrator(providers: Vec<Scripted>) -> Orchestrator {
    providers.into_iter().fold(
        Orchestrator::new(OrchestratorConfig::default(), bus()),
        |o, p| o.with_provider(Arc::new(p)),
    )
}

/// Safety's decline beats a more confident goal on precedence.
#[tokio::test(start_paused = true)]
async fn test_precedence_decides_strict_conflict() {
    let orch = orchestrator(vec![
        Scripted::new("goals", SourceCategory::Goal, ActionTag::Proceed, 0.95),
        Scripted::new("safety", SourceCategory::Safety, ActionTag::Decline, 0.9),
    ]);
    let outcome = orch.process(RequestContext::new("delete everything")).await;

    assert_eq!(outcome.action(), ActionTag::Decline);
    let resolution = outcome.resolution.as_ref().unwrap();
    assert_eq!(resolution.strategy, ResolutionStrategy::Fallback);
    assert_eq!(resolution.conflicts.len(), 1);
    assert_eq!(outcome.phase, RequestPhase::Done);
    assert!(outcome.faults.is_empty());
    assert!(outcome
        .annotations
        .iter()
        .any(|a| a.contains("no continuity provider")));
}

/// A hung provider never delays the outcome past the aggregate deadline.
#[tokio::test(start_paused = true)]
async fn test_hung_provider_degrades_within_deadline() {
    let orch = orchestrator(vec![
        Scripted::new("emotion", SourceCategory::Emotional, ActionTag::Proceed, 0.7),
        Scripted::new("reflection", SourceCategory::Reflection, ActionTag::Defer, 0.9).hung(),
    ]);
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(outcome.elapsed <= Duration::from_millis(150));
    assert_eq!(outcome.degraded_sources, vec!["reflection".to_string()]);
    assert_eq!(outcome.action(), ActionTag::Proceed);
    assert!(outcome.is_degraded());
    assert!(!outcome.deadline_exceeded);
    assert!(matches!(
        outcome.faults[0],
        Fault::SourceDegraded { ref provider, .. } if provider == "reflection"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_aggregate_deadline_keeps_partial_result() {
    let config = OrchestratorConfig {
        provider_deadline_ms: 1_000,
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::new(config, bus())
        .with_provider(Arc::new(Scripted::new("goals", SourceCategory::Goal, ActionTag::Explore, 0.8)))
        .with_provider(Arc::new(
            Scripted::new("memory", SourceCategory::Memory, ActionTag::Clarify, 0.8).hung(),
        ))
        .with_continuity(Arc::new(Continuity {
            action: ActionTag::Decline,
            fail: false,
        }));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(outcome.deadline_exceeded);
    assert!(outcome.faults.contains(&Fault::DeadlineExceeded { budget_ms: 150 }));
    assert_eq!(outcome.action(), ActionTag::Explore);
    assert!(outcome.annotations.iter().any(|a| a.contains("no budget left")));
    assert!(!outcome.incoherent);
    assert_eq!(outcome.phase, RequestPhase::DoneDegraded);
}

#[tokio::test(start_paused = true)]
async fn test_soft_conflict_synthesizes() {
    let orch = orchestrator(vec![
        Scripted::new("goals", SourceCategory::Goal, ActionTag::Proceed, 0.8),
        Scripted::new("emotion", SourceCategory::Emotional, ActionTag::Defer, 0.7),
    ]);
    let outcome = orch.process(RequestContext::new("let's ship it")).await;

    assert_eq!(outcome.action(), ActionTag::ProceedWithCaution);
    assert_eq!(outcome.resolution.as_ref().unwrap().strategy, ResolutionStrategy::Synthesis);
    assert!(outcome.annotations[0].starts_with("proceed_with_caution"));
    assert_eq!(outcome.phase, RequestPhase::Done);
}

/// Deadlocked decisions go out urgent with halved confidence.
#[tokio::test(start_paused = true)]
async fn test_deadlock_is_urgent_and_low_confidence() {
    let bus = bus();
    let recorder = Arc::new(Recorder::default());
    bus.subscribe(recorder.clone()).await;
    let orch = Orchestrator::new(OrchestratorConfig::default(), bus)
        .with_provider(Arc::new(Scripted::new("safety", SourceCategory::Safety, ActionTag::Explore, 0.95)))
        .with_provider(Arc::new(Scripted::new("memory", SourceCategory::Memory, ActionTag::Clarify, 0.45)));
    let outcome = orch.process(RequestContext::new("tell me more")).await;

    assert!(outcome.is_deadlocked());
    assert_eq!(outcome.action(), ActionTag::Explore);
    assert!((outcome.confidence - 0.475).abs() < 1e-6);
    assert!(outcome.resolution.as_ref().unwrap().low_confidence);
    assert!(outcome.faults.contains(&Fault::ConflictDeadlock { iterations: 5 }));
    assert_eq!(outcome.phase, RequestPhase::DoneDegraded);
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![(MessageKind::Decision, MessagePriority::Urgent)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_coherence_regenerates_toward_continuity() {
    let orch = orchestrator(vec![Scripted::new("goals", SourceCategory::Goal, ActionTag::Explore, 0.8)])
        .with_continuity(Arc::new(Continuity {
            action: ActionTag::Clarify,
            fail: false,
        }));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert_eq!(outcome.action(), ActionTag::ProceedWithCaution);
    assert!(!outcome.incoherent);
    assert_eq!(outcome.phase, RequestPhase::Done);
    assert!(outcome.annotations.iter().any(|a| a.starts_with("regenerated explore")));
}

#[tokio::test(start_paused = true)]
async fn test_incoherent_draft_is_flagged() {
    let config = OrchestratorConfig {
        coherence_max_retries: 0,
        ..OrchestratorConfig::default()
    };
    let bus = bus();
    let recorder = Arc::new(Recorder::default());
    bus.subscribe(recorder.clone()).await;
    let orch = Orchestrator::new(config, bus)
        .with_provider(Arc::new(Scripted::new("goals", SourceCategory::Goal, ActionTag::Explore, 0.8)))
        .with_continuity(Arc::new(Continuity {
            action: ActionTag::Decline,
            fail: false,
        }));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(outcome.incoherent);
    assert_eq!(outcome.action(), ActionTag::Explore);
    assert!(matches!(outcome.faults[0], Fault::CoherenceFailure { .. }));
    assert!(outcome.annotations.iter().any(|a| a.starts_with("incoherent")));
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![(MessageKind::Decision, MessagePriority::Urgent)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_continuity_skips_check() {
    let orch = orchestrator(vec![Scripted::new("goals", SourceCategory::Goal, ActionTag::Explore, 0.8)])
        .with_continuity(Arc::new(Continuity {
            action: ActionTag::Decline,
            fail: true,
        }));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(!outcome.incoherent);
    assert_eq!(outcome.action(), ActionTag::Explore);
    assert!(outcome
        .annotations
        .iter()
        .any(|a| a == "coherence check skipped: continuity failed"));
    assert_eq!(outcome.phase, RequestPhase::Done);
}

/// Continuity that never answers in time.
struct StalledContinuity;

#[async_trait]
impl ContinuityProvider for StalledContinuity {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn reference(&self, _ctx: &RequestContext, _deadline: Deadline) -> anyhow::Result<ContinuityReference> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("unreachable in time")
    }
}

/// Takes its time with every decision on the sync lane.
struct SlowDecisionHandler;

#[async_trait]
impl MessageHandler for SlowDecisionHandler {
    fn name(&self) -> &str {
        "slow_decision"
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        kind == MessageKind::Decision
    }

    async fn handle(&self, _envelope: &MessageEnvelope) -> anyhow::Result<Option<MessagePayload>> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(None)
    }
}

/// A slow sync handler cannot hold the request past the aggregate deadline.
#[tokio::test(start_paused = true)]
async fn test_slow_decision_handler_is_cut_off() {
    let bus = bus();
    bus.subscribe(Arc::new(SlowDecisionHandler)).await;
    let orch = Orchestrator::new(OrchestratorConfig::default(), bus)
        .with_provider(Arc::new(Scripted::new("goals", SourceCategory::Goal, ActionTag::Proceed, 0.8)));

    let started = tokio::time::Instant::now();
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(outcome.elapsed >= Duration::from_millis(150));
    assert!(outcome.elapsed < Duration::from_millis(200));
    assert_eq!(outcome.action(), ActionTag::Proceed);
    assert!(outcome.deadline_exceeded);
    assert_eq!(outcome.faults, vec![Fault::DeadlineExceeded { budget_ms: 150 }]);
    assert_eq!(outcome.phase, RequestPhase::DoneDegraded);
    assert!(outcome
        .annotations
        .iter()
        .any(|a| a == "decision dispatch cut off by the deadline"));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_continuity_counts_as_deadline() {
    let orch = orchestrator(vec![Scripted::new("goals", SourceCategory::Goal, ActionTag::Explore, 0.8)])
        .with_continuity(Arc::new(StalledContinuity));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert_eq!(outcome.action(), ActionTag::Explore);
    assert!(outcome.elapsed < Duration::from_millis(200));
    assert!(outcome.deadline_exceeded);
    assert_eq!(outcome.faults, vec![Fault::DeadlineExceeded { budget_ms: 150 }]);
    assert_eq!(outcome.phase, RequestPhase::DoneDegraded);
    assert!(outcome
        .annotations
        .iter()
        .any(|a| a == "coherence check skipped: stalled timed out"));
}

/// Nothing left of the budget once the draft is ready: the skipped check
/// is reported as a deadline fault, not only as a note.
#[tokio::test(start_paused = true)]
async fn test_no_budget_for_coherence_is_deadline_fault() {
    let config = OrchestratorConfig {
        aggregate_deadline_ms: 0,
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::new(config, bus()).with_continuity(Arc::new(Continuity {
        action: ActionTag::Decline,
        fail: false,
    }));
    let outcome = orch.process(RequestContext::new("hi")).await;

    assert!(outcome.annotations.iter().any(|a| a.contains("no budget left")));
    assert!(outcome.deadline_exceeded);
    assert_eq!(outcome.faults, vec![Fault::DeadlineExceeded { budget_ms: 0 }]);
    assert_eq!(outcome.phase, RequestPhase::DoneDegraded);
    assert!(!outcome.incoherent);
}

#[tokio::test]
async fn test_no_providers_gives_neutral_default() {
    let orch = orchestrator(vec![]);
    let outcome = orch.process(RequestContext::new("anyone there?")).await;

    assert_eq!(outcome.action(), ActionTag::Proceed);
    assert_eq!(outcome.confidence, 0.0);
    assert_eq!(outcome.tier, Tier::Fast);
    assert_eq!(outcome.attention_score, 0.0);
    assert!(outcome.resolution.is_none());
}

/// High attention asks for deep processing; the journal sees it along with
/// the decision log once the async lane drains.
#[tokio::test]
async fn test_deep_tier_posts_request_and_log() {
    let bus = bus();
    let journal = Arc::new(DecisionJournal::new(16));
    bus.subscribe(journal.clone()).await;
    let orch = Orchestrator::new(OrchestratorConfig::default(), bus.clone())
        .with_provider(Arc::new(
            Scripted::new("safety", SourceCategory::Safety, ActionTag::Proceed, 0.9).salience(1.0),
        ))
        .with_provider(Arc::new(
            Scripted::new("emotion", SourceCategory::Emotional, ActionTag::Explore, 0.9).salience(1.0),
        ));
    let outcome = orch.process(RequestContext::new("big news")).await;
    assert_eq!(outcome.tier, Tier::StandardDeepAsync);
    assert!((outcome.attention_score - 1.8).abs() < 1e-5);

    let late = SignalEnvelope::new(
        "learning",
        SourceCategory::Learning,
        Recommendation::new(ActionTag::Clarify),
        0.5,
        0.2,
    );
    assert!(orch.post_late_signal(outcome.request_id, late.clone()));

    let token = CancellationToken::new();
    let dispatcher = bus.spawn_dispatcher(token.clone());
    token.cancel();
    dispatcher.await.unwrap();

    let record = journal.find(outcome.request_id).await.unwrap();
    assert_eq!(record.outcome, outcome);
    assert_eq!(record.envelopes.len(), 2);
    assert_eq!(
        record.phases,
        vec![RequestPhase::FanningOut, RequestPhase::Scoring, RequestPhase::SynthesizingDraft, RequestPhase::Done]
    );
    assert_eq!(journal.deep_requests().await, vec![outcome.request_id]);
    let late_entries = journal.late_signals().await;
    assert_eq!(late_entries.len(), 1);
    assert_eq!(late_entries[0].request_id, Some(outcome.request_id));
    assert_eq!(late_entries[0].envelope, late);
}

/// Requests are independent and can run side by side.
#[tokio::test(start_paused = true)]
async fn test_concurrent_requests() {
    let orch = Arc::new(orchestrator(vec![
        Scripted::new("goals", SourceCategory::Goal, ActionTag::Proceed, 0.8),
        Scripted::new("reflection", SourceCategory::Reflection, ActionTag::Defer, 0.9).hung(),
    ]));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.process(RequestContext::new(format!("request {i}"))).await })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.degraded_sources, vec!["reflection".to_string()]);
        assert!(outcome.elapsed <= Duration::from_millis(150));
    }
}


/// The emotion engine's provider drives the decision when it is alone.
#[tokio::test]
async fn test_emotion_engine_as_provider() {
    use anima_core::{Dimension, InfluenceEvent, PhysicsConfig};
    use anima_limbic::{action_for, EmotionEngine, EmotionSignalProvider, HeartbeatConfig};

    let engine = Arc::new(EmotionEngine::new(PhysicsConfig::default(), HeartbeatConfig::default()).unwrap());
    engine
        .submit_influence(
            InfluenceEvent::new("user", 1.0, Duration::from_secs(60)).with_delta(Dimension::Curiosity, 0.5),
        )
        .unwrap();
    for _ in 0..3 {
        engine.tick().await;
    }

    let orch = Orchestrator::new(OrchestratorConfig::default(), bus())
        .with_provider(Arc::new(EmotionSignalProvider::new(engine.clone())));
    let outcome = orch.process(RequestContext::new("what's new?")).await;

    assert!(outcome.degraded_sources.is_empty());
    assert_eq!(outcome.action(), action_for(&engine.snapshot()));
    assert!((outcome.confidence - engine.snapshot().stability).abs() < 1e-6);
}
