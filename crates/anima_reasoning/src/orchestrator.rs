use crate::attention::{attention_score, select_tier};
use crate::coherence::CoherenceCheck;
use crate::conflict::{describe, detect_conflicts, precedence_pick, ConflictResolver};
use crate::fanout::{FanOut, FanOutResult};
use anima_core::{
    ActionTag, ContinuityProvider, Deadline, DecisionRecord, Fault, MessageBus, MessageEnvelope,
    MessagePayload, MessagePriority, OrchestratorConfig, Outcome, Recommendation, RequestContext,
    RequestPhase, ResolutionStrategy, SignalEnvelope, SignalProvider, Tier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SOURCE: &str = "orchestrator";

/// Per-request lifecycle, recorded for the decision journal.
struct PhaseTrace {
    phases: Vec<RequestPhase>,
}

impl PhaseTrace {
    fn new() -> Self {
        Self {
            phases: vec![RequestPhase::FanningOut],
        }
    }

    fn current(&self) -> RequestPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(RequestPhase::FanningOut)
    }

    fn advance(&mut self, next: RequestPhase) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal request phase transition {:?} -> {:?}",
            self.current(),
            next
        );
        self.phases.push(next);
    }
}

/// Fans a request out to every signal provider, weighs what comes back and
/// produces one recommendation within the aggregate deadline.
///
/// Every request yields an [`Outcome`]. Slow or failing providers, conflicts
/// that cannot be bridged and incoherent drafts degrade the outcome and are
/// recorded as faults instead of surfacing as errors.
pub struct Orchestrator {
    config: OrchestratorConfig,
    providers: Vec<Arc<dyn SignalProvider>>,
    continuity: Option<Arc<dyn ContinuityProvider>>,
    bus: Arc<MessageBus>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            config,
            providers: Vec::new(),
            continuity: None,
            bus,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        tracing::debug!(provider = provider.name(), category = %provider.category(), "Signal provider registered");
        self.providers.push(provider);
        self
    }

    pub fn with_continuity(mut self, continuity: Arc<dyn ContinuityProvider>) -> Self {
        self.continuity = Some(continuity);
        self
    }

    /// In-flight provider calls are cancelled together with `token`.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Forward a signal that arrived after `request_id` was decided.
    pub fn post_late_signal(&self, request_id: Uuid, envelope: SignalEnvelope) -> bool {
        self.bus.post(
            MessageEnvelope::new(envelope.provider.clone(), MessagePayload::LateSignal(Box::new(envelope)))
                .correlated_with(request_id),
        )
    }

    pub async fn process(&self, ctx: RequestContext) -> Outcome {
        let start = Instant::now();
        let aggregate_at = start + self.config.aggregate_deadline();
        let request_id = ctx.request_id;
        let ctx = Arc::new(ctx);
        let mut trace = PhaseTrace::new();
        let mut annotations = Vec::new();

        // ====================================================================
        // Fan-out
        // ====================================================================
        let FanOutResult {
            envelopes,
            degraded,
            mut faults,
            mut deadline_exceeded,
        } = FanOut::new(self.config.provider_deadline(), self.config.aggregate_deadline())
            .collect(&self.providers, &ctx, aggregate_at, &self.shutdown)
            .await;

        // ====================================================================
        // Attention and conflicts
        // ====================================================================
        trace.advance(RequestPhase::Scoring);
        let score = attention_score(&envelopes, &self.config.attention_weights, self.config.min_weight);
        let tier = select_tier(score, &self.config);

        let conflicts = detect_conflicts(&envelopes, self.config.materiality);
        let resolution = if conflicts.is_empty() {
            None
        } else {
            trace.advance(RequestPhase::Resolving);
            tracing::debug!(%request_id, conflicts = conflicts.len(), "Resolving signal conflicts");
            let resolution = ConflictResolver::new(&self.config).resolve(&envelopes, conflicts);
            if let Some(r) = &resolution {
                annotations.push(describe(r, &envelopes));
                if r.strategy == ResolutionStrategy::DeadlockDefault {
                    faults.push(Fault::ConflictDeadlock {
                        iterations: r.iterations,
                    });
                }
            }
            resolution
        };

        // ====================================================================
        // Draft
        // ====================================================================
        trace.advance(RequestPhase::SynthesizingDraft);
        let (mut recommendation, confidence) = match &resolution {
            Some(r) => (r.recommendation.clone(), r.confidence),
            None => match precedence_pick(&self.config.precedence, &envelopes) {
                Some(e) => (e.recommendation.clone(), e.confidence),
                None => {
                    annotations.push("no signals arrived, neutral default".to_string());
                    (Recommendation::new(ActionTag::Proceed), 0.0)
                }
            },
        };

        // ====================================================================
        // Coherence
        // ====================================================================
        let mut incoherent = false;
        match &self.continuity {
            None => annotations.push("coherence check skipped: no continuity provider".to_string()),
            Some(_) if Instant::now() >= aggregate_at => {
                tracing::warn!(%request_id, "No budget left for the coherence check");
                annotations.push("coherence check skipped: no budget left".to_string());
                deadline_exceeded = true;
                record_deadline(&mut faults, self.config.aggregate_deadline());
            }
            Some(continuity) => {
                trace.advance(RequestPhase::CoherenceChecking);
                let deadline = Deadline::new(aggregate_at, self.shutdown.child_token());
                let budget = deadline.remaining();
                match timeout(budget, continuity.reference(&ctx, deadline.clone())).await {
                    Ok(Ok(reference)) => {
                        let check = CoherenceCheck::new(&self.config);
                        let draft = recommendation.action;
                        let verdict = check.check(draft, reference.action);
                        if verdict.regenerations > 0 {
                            trace.advance(RequestPhase::Regenerating);
                            annotations.push(format!(
                                "regenerated {} as {} toward {} from {}",
                                draft,
                                verdict.action,
                                reference.action,
                                continuity.name()
                            ));
                            recommendation.action = verdict.action;
                        }
                        if let Some(fault) = verdict.fault(check.threshold) {
                            tracing::warn!(%request_id, divergence = verdict.divergence, "Draft incoherent with continuity");
                            incoherent = true;
                            annotations.push(format!(
                                "incoherent: {} diverges from {} by {:.2} ({})",
                                verdict.action, reference.action, verdict.divergence, reference.rationale
                            ));
                            faults.push(fault);
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(continuity = continuity.name(), "Continuity reference failed: {:#}", e);
                        annotations.push(format!("coherence check skipped: {} failed", continuity.name()));
                    }
                    Err(_) => {
                        deadline.token.cancel();
                        tracing::warn!(continuity = continuity.name(), "Continuity reference timed out");
                        annotations.push(format!("coherence check skipped: {} timed out", continuity.name()));
                        deadline_exceeded = true;
                        record_deadline(&mut faults, self.config.aggregate_deadline());
                    }
                }
            }
        }

        let phase = if faults.is_empty() {
            RequestPhase::Done
        } else {
            RequestPhase::DoneDegraded
        };

        let mut outcome = Outcome {
            request_id,
            tier,
            attention_score: score,
            recommendation,
            confidence,
            annotations,
            incoherent,
            degraded_sources: degraded,
            resolution,
            faults,
            deadline_exceeded,
            phase,
            elapsed: start.elapsed(),
        };

        if !self.dispatch_decision(&outcome, aggregate_at).await {
            outcome
                .annotations
                .push("decision dispatch cut off by the deadline".to_string());
            outcome.deadline_exceeded = true;
            record_deadline(&mut outcome.faults, self.config.aggregate_deadline());
            outcome.phase = RequestPhase::DoneDegraded;
        }
        trace.advance(outcome.phase);
        outcome.elapsed = start.elapsed();

        tracing::info!(
            %request_id,
            tier = tier.as_str(),
            action = %outcome.action(),
            confidence = outcome.confidence,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Request decided"
        );

        self.post_records(&outcome, trace.phases, envelopes, &ctx);
        outcome
    }

    // ========================================================================
    // Emit
    // ========================================================================

    /// Sync lane, bounded by the aggregate deadline. Returns `false` when a
    /// handler was still running at the deadline; the rest of the dispatch is
    /// dropped.
    async fn dispatch_decision(&self, outcome: &Outcome, aggregate_at: Instant) -> bool {
        let request_id = outcome.request_id;
        let priority = if outcome.incoherent || outcome.is_deadlocked() {
            MessagePriority::Urgent
        } else {
            MessagePriority::Normal
        };
        let envelope = MessageEnvelope::new(SOURCE, MessagePayload::Decision(Box::new(outcome.clone())))
            .with_priority(priority)
            .correlated_with(request_id);

        let budget = aggregate_at.saturating_duration_since(Instant::now());
        match timeout(budget, self.bus.dispatch(envelope)).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    tracing::warn!(%request_id, failures = report.failures.len(), "Decision handlers failed");
                }
                true
            }
            Err(_) => {
                tracing::warn!(
                    %request_id,
                    budget_ms = self.config.aggregate_deadline_ms,
                    "Decision handlers still running at the aggregate deadline"
                );
                false
            }
        }
    }

    /// Async lane: decision log and, for the deep tier, a follow-up request.
    fn post_records(
        &self,
        outcome: &Outcome,
        phases: Vec<RequestPhase>,
        envelopes: Vec<SignalEnvelope>,
        ctx: &RequestContext,
    ) {
        let request_id = outcome.request_id;
        let record = DecisionRecord {
            outcome: outcome.clone(),
            conflicts: outcome
                .resolution
                .as_ref()
                .map(|r| r.conflicts.clone())
                .unwrap_or_default(),
            phases,
            envelopes,
        };
        self.bus.post(
            MessageEnvelope::new(SOURCE, MessagePayload::DecisionLog(Box::new(record)))
                .correlated_with(request_id),
        );

        if outcome.tier == Tier::StandardDeepAsync {
            self.bus.post(
                MessageEnvelope::new(
                    SOURCE,
                    MessagePayload::DeepProcessingRequest {
                        request_id,
                        attention_score: outcome.attention_score,
                        text: ctx.text.clone(),
                    },
                )
                .correlated_with(request_id),
            );
        }
    }
}

fn record_deadline(faults: &mut Vec<Fault>, budget: Duration) {
    let fault = Fault::DeadlineExceeded {
        budget_ms: budget.as_millis() as u64,
    };
    if !faults.contains(&fault) {
        faults.push(fault);
    }
}
