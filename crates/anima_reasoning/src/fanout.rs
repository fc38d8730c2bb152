//! Concurrent provider fan-out under a per-provider and an aggregate deadline.

use anima_core::{Deadline, Fault, RequestContext, SignalEnvelope, SignalProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// What came back from one fan-out round.
#[derive(Debug, Default)]
pub struct FanOutResult {
    /// In arrival order.
    pub envelopes: Vec<SignalEnvelope>,
    pub degraded: Vec<String>,
    pub faults: Vec<Fault>,
    pub deadline_exceeded: bool,
}

pub struct FanOut {
    pub provider_deadline: Duration,
    pub aggregate_deadline: Duration,
}

impl FanOut {
    pub fn new(provider_deadline: Duration, aggregate_deadline: Duration) -> Self {
        Self {
            provider_deadline,
            aggregate_deadline,
        }
    }

    /// Ask every provider at once and collect what arrives before
    /// `aggregate_at`. Provider failures and timeouts degrade the result;
    /// they never fail it.
    pub async fn collect(
        &self,
        providers: &[Arc<dyn SignalProvider>],
        ctx: &Arc<RequestContext>,
        aggregate_at: Instant,
        parent: &CancellationToken,
    ) -> FanOutResult {
        let mut result = FanOutResult::default();
        if providers.is_empty() {
            return result;
        }

        let token = parent.child_token();
        let provider_at = Instant::now() + self.provider_deadline;
        let mut tasks = JoinSet::new();
        for (index, provider) in providers.iter().enumerate() {
            let provider = Arc::clone(provider);
            let ctx = Arc::clone(ctx);
            let deadline = Deadline::new(provider_at, token.child_token());
            let budget = deadline.remaining();
            tasks.spawn(async move {
                let answer = match timeout(budget, provider.get_signal(&ctx, deadline.clone())).await {
                    Ok(Ok(envelope)) => Ok(envelope),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(_) => {
                        deadline.token.cancel();
                        Err(format!("no answer within {}ms", budget.as_millis()))
                    }
                };
                (index, answer)
            });
        }

        let mut answered = vec![false; providers.len()];
        let aggregate = tokio::time::sleep_until(aggregate_at);
        tokio::pin!(aggregate);

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, answer))) => {
                        answered[index] = true;
                        let name = providers[index].name();
                        match answer {
                            Ok(envelope) => {
                                tracing::trace!(provider = name, action = %envelope.action(), "Signal received");
                                result.envelopes.push(envelope);
                            }
                            Err(reason) => {
                                tracing::warn!(provider = name, %reason, "Signal provider degraded");
                                result.degrade(name, reason);
                            }
                        }
                    }
                    // Panicked or aborted; its slot stays unanswered.
                    Some(Err(e)) => tracing::warn!("Signal provider task failed: {}", e),
                },
                _ = &mut aggregate => {
                    tracing::warn!(
                        budget_ms = self.aggregate_deadline.as_millis() as u64,
                        "Aggregate deadline hit during fan-out"
                    );
                    result.deadline_exceeded = true;
                    result.faults.push(Fault::DeadlineExceeded {
                        budget_ms: self.aggregate_deadline.as_millis() as u64,
                    });
                    break;
                }
            }
        }

        token.cancel();
        tasks.abort_all();

        for (index, done) in answered.into_iter().enumerate() {
            if !done {
                let reason = if result.deadline_exceeded {
                    "cut off by the aggregate deadline"
                } else {
                    "provider task failed"
                };
                result.degrade(providers[index].name(), reason.to_string());
            }
        }
        result
    }
}

impl FanOutResult {
    fn degrade(&mut self, provider: &str, reason: String) {
        self.degraded.push(provider.to_string());
        self.faults.push(Fault::SourceDegraded {
            provider: provider.to_string(),
            reason,
        });
    }
}
