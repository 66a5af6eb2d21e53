//! # Dispatcher
//!
//! Fans one message out to a snapshot of its subscribers.
//!
//! Each handler runs in isolation: a returned error or a panic is captured
//! for that handler only and handed to the retry manager, so the remaining
//! subscribers still receive the message. Nothing is retried inline.

use std::any::Any;
use std::ops::AddAssign;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    ChannelRegistry, Handler, HandlerError, HistoryStore, Message, MetricsStore, Payload,
};
use crate::ports::TimeSource;
use crate::service::retry::{FailedDelivery, RetryManager};

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.delivered + self.failed
    }
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Invoke `handler`, converting a panic into `HandlerError::Panicked`.
pub(crate) fn invoke(handler: &Handler, payload: &Payload) -> Result<(), HandlerError> {
    match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    metrics: Arc<MetricsStore>,
    history: Arc<HistoryStore>,
    retries: RetryManager,
    clock: Arc<dyn TimeSource>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        metrics: Arc<MetricsStore>,
        history: Arc<HistoryStore>,
        retries: RetryManager,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            registry,
            metrics,
            history,
            retries,
            clock,
        }
    }

    /// Deliver `message` to every current subscriber of its event.
    ///
    /// Always records history and one metrics sample, even with zero
    /// subscribers.
    pub fn dispatch(&self, message: &Message) -> DispatchReport {
        let event = message.event();
        let subscribers = self.registry.snapshot(event);
        if subscribers.is_empty() {
            warn!(event, priority = %message.priority(), "No subscribers for event");
        }

        let started = self.clock.now();
        self.history
            .record(event, message.shared_payload(), started);

        let mut report = DispatchReport::default();
        let mut failures = Vec::new();
        for subscription in subscribers {
            match invoke(&subscription.handler, message.payload()) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        event,
                        token = %subscription.token,
                        error = %error,
                        "Handler failed"
                    );
                    report.failed += 1;
                    failures.push(FailedDelivery {
                        message: message.clone(),
                        subscription,
                        error,
                    });
                }
            }
        }

        let latency_ms = self.clock.now().saturating_sub(started);
        self.metrics.record(event, latency_ms, report.failed > 0);
        debug!(
            event,
            priority = %message.priority(),
            delivered = report.delivered,
            failed = report.failed,
            latency_ms,
            "Message dispatched"
        );

        for failure in failures {
            self.retries.handle_failure(failure);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::domain::{handler_fn, Priority, RetryPolicyTable};
    use crate::ports::ManualTimeSource;
    use crate::service::scheduler::Scheduler;
    use crate::MESSAGE_ERROR_EVENT;
    use serde_json::json;

    struct Fixture {
        registry: Arc<ChannelRegistry>,
        metrics: Arc<MetricsStore>,
        history: Arc<HistoryStore>,
        scheduler: Arc<Scheduler>,
        clock: Arc<ManualTimeSource>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ChannelRegistry::new());
        let metrics = Arc::new(MetricsStore::new());
        let history = Arc::new(HistoryStore::new(100));
        let scheduler = Arc::new(Scheduler::new(&BusConfig::default()));
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let (retries, _jobs) = RetryManager::new(
            Arc::new(RetryPolicyTable::new()),
            Arc::clone(&metrics),
            Arc::clone(&scheduler),
            clock.clone(),
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Arc::clone(&history),
            retries,
            clock.clone(),
        );
        Fixture {
            registry,
            metrics,
            history,
            scheduler,
            clock,
            dispatcher,
        }
    }

    #[test]
    fn test_invoke_captures_panic() {
        let handler = handler_fn(|_| panic!("kaboom"));
        let result = invoke(&handler, &json!(null));
        assert_eq!(result, Err(HandlerError::Panicked("kaboom".to_string())));
    }

    #[test]
    fn test_failure_is_isolated() {
        let f = fixture();
        f.registry
            .subscribe("x", handler_fn(|_| Err(HandlerError::failed("nope"))));
        f.registry.subscribe("x", handler_fn(|_| Ok(())));

        let report = f
            .dispatcher
            .dispatch(&Message::new("x", json!(1), Priority::Normal, 0));

        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(f.metrics.get("x").unwrap().errors, 1);
        // No policy: the failure escalates straight to message-error.
        assert_eq!(f.scheduler.depths().normal, 1);
        assert_eq!(f.scheduler.next_ready().unwrap().event(), MESSAGE_ERROR_EVENT);
    }

    #[test]
    fn test_zero_subscribers_still_recorded() {
        let f = fixture();
        let report = f
            .dispatcher
            .dispatch(&Message::new("ghost", json!({"id": 1}), Priority::High, 0));

        assert_eq!(report.subscribers(), 0);
        assert_eq!(f.metrics.get("ghost").unwrap().total_messages, 1);
        assert_eq!(f.history.entries("ghost").len(), 1);
    }

    #[test]
    fn test_latency_uses_clock() {
        let f = fixture();
        let clock = Arc::clone(&f.clock);
        f.registry.subscribe(
            "slow",
            handler_fn(move |_| {
                clock.advance(250);
                Ok(())
            }),
        );

        f.dispatcher
            .dispatch(&Message::new("slow", json!(null), Priority::Normal, 0));

        let metric = f.metrics.get("slow").unwrap();
        assert!((metric.avg_latency_ms - 250.0).abs() < f64::EPSILON);
        assert_eq!(f.history.entries("slow")[0].timestamp, 1_000);
    }

    #[test]
    fn test_reports_accumulate() {
        let mut total = DispatchReport::default();
        total += DispatchReport { delivered: 2, failed: 1 };
        total += DispatchReport { delivered: 1, failed: 0 };

        assert_eq!(total, DispatchReport { delivered: 3, failed: 1 });
        assert_eq!(total.subscribers(), 4);
    }
}
