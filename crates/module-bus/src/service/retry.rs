//! # Retry Manager
//!
//! Takes over a delivery once a handler has failed, following the
//! `RetryState` machine:
//!
//! - With a policy, retry `n` waits `backoff_ms * n` and re-invokes the same
//!   handler with the same payload.
//! - Success at any attempt ends the job quietly.
//! - Without a policy, or once `max_retries` retries have failed, a
//!   `message-error` event `{event, error, data}` is published at `normal`
//!   priority.
//!
//! Failures of `message-error` handlers are never escalated into another
//! `message-error`; they are logged and dropped.
//!
//! Backoff waits run in their own tasks, so a slow retry never delays any
//! tier of the scheduler.
//!
//! Every job is stamped with the manager's generation. `cancel_pending`
//! bumps the generation; a job from an older generation is dropped before
//! its next invocation and never escalates.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::{
    HandlerError, Message, MetricsStore, Priority, RetryPolicy, RetryPolicyTable, RetryState,
    Subscription,
};
use crate::ports::TimeSource;
use crate::service::dispatcher::invoke;
use crate::service::scheduler::Scheduler;
use crate::MESSAGE_ERROR_EVENT;

/// One handler that failed to process one message.
#[derive(Debug, Clone)]
pub struct FailedDelivery {
    pub message: Message,
    pub subscription: Subscription,
    pub error: HandlerError,
}

/// A delivery waiting for its retries.
#[derive(Debug)]
pub struct RetryJob {
    delivery: FailedDelivery,
    policy: RetryPolicy,
    state: RetryState,
    generation: u64,
}

#[derive(Clone)]
pub struct RetryManager {
    policies: Arc<RetryPolicyTable>,
    metrics: Arc<MetricsStore>,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn TimeSource>,
    jobs: mpsc::UnboundedSender<RetryJob>,
    generation: Arc<AtomicU64>,
}

impl RetryManager {
    /// Create the manager and the job queue consumed by `run`.
    pub fn new(
        policies: Arc<RetryPolicyTable>,
        metrics: Arc<MetricsStore>,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn TimeSource>,
    ) -> (Self, mpsc::UnboundedReceiver<RetryJob>) {
        let (jobs, receiver) = mpsc::unbounded_channel();
        (
            Self {
                policies,
                metrics,
                scheduler,
                clock,
                jobs,
                generation: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Route a failed delivery: schedule retries or escalate immediately.
    ///
    /// The policy is read once here; later changes to the table do not
    /// affect a job already in flight.
    pub fn handle_failure(&self, delivery: FailedDelivery) -> RetryState {
        let policy = self.policies.get(delivery.message.event());
        let state = RetryState::Pending.on_failure(policy.map(|p| p.max_retries));

        let (RetryState::Retrying(_), Some(policy)) = (state, policy) else {
            self.escalate(&delivery.message, &delivery.error);
            return RetryState::Exhausted;
        };

        debug!(
            event = delivery.message.event(),
            token = %delivery.subscription.token,
            max_retries = policy.max_retries,
            backoff_ms = policy.backoff_ms,
            "Scheduling retries"
        );
        let job = RetryJob {
            delivery,
            policy,
            state,
            generation: self.generation.load(Ordering::SeqCst),
        };
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            warn!(event = job.delivery.message.event(), "Retry worker gone, escalating");
            self.escalate(&job.delivery.message, &job.delivery.error);
            return RetryState::Exhausted;
        }
        state
    }

    /// Drop every queued and in-flight job.
    ///
    /// Jobs already waiting out a backoff notice on wake-up; jobs still in
    /// the queue are discarded when the worker receives them.
    pub fn cancel_pending(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Pending retries cancelled");
    }

    fn is_stale(&self, job_generation: u64) -> bool {
        job_generation != self.generation.load(Ordering::SeqCst)
    }

    /// Worker loop: run every queued job in its own task until shutdown.
    pub async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<RetryJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) if self.is_stale(job.generation) => {
                        debug!(event = job.delivery.message.event(), "Discarding cancelled retry");
                    }
                    Some(job) => {
                        in_flight.spawn(self.clone().retry(job));
                    }
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown handle dropped, stopping retry worker");
                    }
                    break;
                }
            }
        }
        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "Abandoning in-flight retries");
        }
        in_flight.shutdown().await;
    }

    /// Drive one job to a terminal state.
    pub async fn retry(self, job: RetryJob) -> RetryState {
        let RetryJob {
            delivery,
            policy,
            mut state,
            generation,
        } = job;
        let event = delivery.message.event();
        let mut last_error = delivery.error.clone();

        while let Some(attempt) = state.attempt() {
            tokio::time::sleep(Duration::from_millis(policy.delay_ms(attempt))).await;
            if self.is_stale(generation) {
                debug!(event, attempt, "Retry cancelled");
                return state.on_cancel();
            }

            let started = self.clock.now();
            let outcome = invoke(&delivery.subscription.handler, delivery.message.payload());
            let latency_ms = self.clock.now().saturating_sub(started);
            self.metrics.record(event, latency_ms, outcome.is_err());

            match outcome {
                Ok(()) => {
                    state = state.on_success();
                    info!(
                        event,
                        token = %delivery.subscription.token,
                        attempt,
                        "Retry succeeded"
                    );
                }
                Err(error) => {
                    warn!(event, attempt, error = %error, "Retry failed");
                    last_error = error;
                    state = state.on_failure(Some(policy.max_retries));
                }
            }
        }

        if state == RetryState::Exhausted {
            if self.is_stale(generation) {
                return RetryState::Cancelled;
            }
            self.escalate(&delivery.message, &last_error);
        }
        state
    }

    fn escalate(&self, message: &Message, error: &HandlerError) {
        if message.event() == MESSAGE_ERROR_EVENT {
            error!(error = %error, "message-error handler failed, not escalating");
            return;
        }

        error!(event = message.event(), error = %error, "Delivery failed permanently");
        let payload = json!({
            "event": message.event(),
            "error": error.to_string(),
            "data": message.payload(),
        });
        self.scheduler.enqueue(Message::new(
            MESSAGE_ERROR_EVENT,
            payload,
            Priority::Normal,
            self.clock.now(),
        ));
    }
}
