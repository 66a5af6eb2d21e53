//! # Message Bus
//!
//! The composition of every bus component behind one cheap, clonable
//! handle. There is no global instance: the application's composition root
//! creates a bus and hands clones (or `Arc<dyn MessageBusApi>`) to its
//! collaborators.
//!
//! ```text
//! publish ──→ Scheduler ──critical──→ Dispatcher (caller's thread)
//!                 │
//!                 └──high/normal/low──→ scheduler task ──→ Dispatcher
//!                                                              │
//!                               Metrics + History ←────────────┤
//!                                                              ↓ failures
//!                                                        RetryManager
//!                                                              │
//!                                 message-error (normal) ←─────┘
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::BusConfig;
use crate::domain::{
    BusError, BusStats, ChannelRegistry, Handler, HandlerError, HistoryEntry, HistoryStore,
    Message, MetricsStore, Payload, Priority, RetryPolicy, RetryPolicyTable, SubscriptionToken,
};
use crate::ports::{MessageBusApi, SystemTimeSource, TimeSource};
use crate::service::dispatcher::{DispatchReport, Dispatcher};
use crate::service::optimizer::Optimizer;
use crate::service::retry::{RetryJob, RetryManager};
use crate::service::scheduler::Scheduler;
use crate::service::workers::BusWorkers;

pub(crate) struct BusCore {
    pub(crate) config: BusConfig,
    pub(crate) registry: Arc<ChannelRegistry>,
    pub(crate) policies: Arc<RetryPolicyTable>,
    pub(crate) metrics: Arc<MetricsStore>,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) retries: RetryManager,
    pub(crate) clock: Arc<dyn TimeSource>,
    /// Taken by the first `start()`.
    pub(crate) retry_jobs: Mutex<Option<mpsc::UnboundedReceiver<RetryJob>>>,
}

/// Handle to an in-process, priority-aware message bus.
#[derive(Clone)]
pub struct MessageBus {
    pub(crate) core: Arc<BusCore>,
}

impl MessageBus {
    /// Create a bus using the system clock.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a bus reading time from `clock`.
    pub fn with_time_source(
        config: BusConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: BusConfig, clock: Arc<dyn TimeSource>) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let policies = Arc::new(RetryPolicyTable::new());
        let metrics = Arc::new(MetricsStore::new());
        let history = Arc::new(HistoryStore::new(config.history_capacity));
        let scheduler = Arc::new(Scheduler::new(&config));
        let (retries, retry_jobs) = RetryManager::new(
            Arc::clone(&policies),
            Arc::clone(&metrics),
            Arc::clone(&scheduler),
            Arc::clone(&clock),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Arc::clone(&history),
            retries.clone(),
            Arc::clone(&clock),
        ));

        Self {
            core: Arc::new(BusCore {
                config,
                registry,
                policies,
                metrics,
                history,
                scheduler,
                dispatcher,
                retries,
                clock,
                retry_jobs: Mutex::new(Some(retry_jobs)),
            }),
        }
    }

    /// Spawn the scheduler, retry and optimizer tasks.
    ///
    /// Until this is called only critical messages are dispatched; other
    /// tiers and retries wait in their queues. Must be called from within a
    /// tokio runtime. A bus can be started once.
    pub fn start(&self) -> Result<BusWorkers, BusError> {
        let jobs = self
            .core
            .retry_jobs
            .lock()
            .take()
            .ok_or(BusError::AlreadyStarted)?;
        Ok(BusWorkers::spawn(self, jobs))
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionToken
    where
        F: Fn(&Payload) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_handler(event, Arc::new(handler))
    }

    pub fn subscribe_handler(&self, event: &str, handler: Handler) -> SubscriptionToken {
        self.core.registry.subscribe(event, handler)
    }

    /// Remove a subscription. A second call with the same token returns
    /// `false`.
    pub fn unsubscribe(&self, event: &str, token: SubscriptionToken) -> bool {
        self.core.registry.unsubscribe(event, token)
    }

    /// Publish `payload` on `event`.
    ///
    /// Critical messages are fully dispatched before this returns. Every
    /// other tier is only enqueued.
    pub fn publish(&self, event: &str, payload: Payload, priority: Priority) {
        let message = Message::new(event, payload, priority, self.core.clock.now());
        self.core.scheduler.enqueue(message);
        debug!(event, %priority, "Message published");

        if priority == Priority::Critical {
            let dispatcher = &self.core.dispatcher;
            let mut report = DispatchReport::default();
            let drained = self.core.scheduler.drain_critical(|message| {
                report += dispatcher.dispatch(message);
            });
            if drained > 0 {
                debug!(
                    drained,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Critical lane drained"
                );
            }
        }
    }

    /// Publish at `normal` priority.
    pub fn publish_normal(&self, event: &str, payload: Payload) {
        self.publish(event, payload, Priority::Normal);
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            channel_count: self.core.registry.channel_count(),
            subscription_count: self.core.registry.subscription_count(),
            history_depth: self.core.history.depths(),
            metrics: self.core.metrics.snapshot(),
            queue_depths: self.core.scheduler.depths(),
        }
    }

    /// Recent deliveries of `event`, oldest first.
    #[must_use]
    pub fn history(&self, event: &str) -> Vec<HistoryEntry> {
        self.core.history.entries(event)
    }

    /// Install or replace the retry policy of `event`.
    pub fn set_retry_policy(&self, event: &str, policy: RetryPolicy) -> Option<RetryPolicy> {
        self.core.policies.set(event, policy)
    }

    pub fn remove_retry_policy(&self, event: &str) -> Option<RetryPolicy> {
        self.core.policies.remove(event)
    }

    #[must_use]
    pub fn retry_policy(&self, event: &str) -> Option<RetryPolicy> {
        self.core.policies.get(event)
    }

    /// Clear subscriptions, retry policies, queues, history and metrics.
    ///
    /// Pending retries are cancelled: queued jobs are discarded and jobs
    /// sleeping through their backoff stop without retrying or escalating.
    /// A dispatch already running completes.
    pub fn cleanup(&self) {
        self.core.retries.cancel_pending();
        if let Some(jobs) = self.core.retry_jobs.lock().as_mut() {
            let mut discarded = 0usize;
            while jobs.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                debug!(discarded, "Discarded queued retries");
            }
        }
        self.core.registry.clear();
        self.core.policies.clear();
        self.core.scheduler.clear();
        self.core.history.clear();
        self.core.metrics.clear();
        debug!("Bus cleaned up");
    }

    /// An optimizer bound to this bus, for on-demand passes.
    #[must_use]
    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new(
            Arc::clone(&self.core.metrics),
            Arc::clone(&self.core.policies),
            Arc::clone(&self.core.scheduler),
            self.core.config.clone(),
        )
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.core.config
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::build(BusConfig::default(), Arc::new(SystemTimeSource))
    }
}

impl MessageBusApi for MessageBus {
    fn subscribe(&self, event: &str, handler: Handler) -> SubscriptionToken {
        self.subscribe_handler(event, handler)
    }

    fn unsubscribe(&self, event: &str, token: SubscriptionToken) -> bool {
        MessageBus::unsubscribe(self, event, token)
    }

    fn publish(&self, event: &str, payload: Payload, priority: Priority) {
        MessageBus::publish(self, event, payload, priority);
    }

    fn stats(&self) -> BusStats {
        MessageBus::stats(self)
    }

    fn cleanup(&self) {
        MessageBus::cleanup(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::ports::ManualTimeSource;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BusConfig {
            batch_size: 0,
            ..BusConfig::default()
        };
        assert!(matches!(
            MessageBus::new(config),
            Err(BusError::Config(ConfigError::ZeroBatchSize))
        ));
    }

    #[test]
    fn test_unbounded_history_is_rejected() {
        let config = BusConfig {
            history_capacity: usize::MAX,
            ..BusConfig::default()
        };
        assert!(matches!(
            MessageBus::new(config),
            Err(BusError::Config(ConfigError::HistoryCapacityTooLarge(_)))
        ));
    }

    #[test]
    fn test_critical_publish_is_synchronous() {
        let bus = MessageBus::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe("load", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish("load", json!({"id": 1}), Priority::Critical);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().metrics["load"].total_messages, 1);
    }

    #[test]
    fn test_non_critical_publish_only_enqueues() {
        let bus = MessageBus::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe("load", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish_normal("load", json!(1));
        bus.publish("load", json!(2), Priority::High);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let depths = bus.stats().queue_depths;
        assert_eq!((depths.high, depths.normal), (1, 1));
    }

    #[test]
    fn test_critical_handler_may_publish_critical() {
        let bus = MessageBus::default();
        let inner = bus.clone();
        bus.subscribe("outer", move |_| {
            inner.publish("inner", json!(null), Priority::Critical);
            Ok(())
        });

        bus.publish("outer", json!(null), Priority::Critical);

        let metrics = bus.stats().metrics;
        assert_eq!(metrics["outer"].total_messages, 1);
        assert_eq!(metrics["inner"].total_messages, 1);
    }

    #[test]
    fn test_history_uses_injected_clock() {
        let clock = Arc::new(ManualTimeSource::new(5_000));
        let bus = MessageBus::with_time_source(BusConfig::default(), clock.clone()).unwrap();

        bus.publish("tick", json!(1), Priority::Critical);
        clock.advance(10);
        bus.publish("tick", json!(2), Priority::Critical);

        let stamps: Vec<u64> = bus.history("tick").iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![5_000, 5_010]);
    }

    #[test]
    fn test_retry_policy_admin() {
        let bus = MessageBus::default();
        assert!(bus.retry_policy("save").is_none());
        bus.set_retry_policy("save", RetryPolicy::new(2, 100));
        assert_eq!(bus.retry_policy("save"), Some(RetryPolicy::new(2, 100)));
        assert_eq!(
            bus.remove_retry_policy("save"),
            Some(RetryPolicy::new(2, 100))
        );
    }

    #[test]
    fn test_cleanup_clears_everything() {
        let bus = MessageBus::default();
        bus.subscribe("load", |_| Ok(()));
        bus.set_retry_policy("load", RetryPolicy::new(1, 1));
        bus.publish("load", json!(1), Priority::Critical);
        bus.publish("later", json!(1), Priority::Low);

        bus.cleanup();

        let stats = bus.stats();
        assert_eq!(stats.channel_count, 0);
        assert_eq!(stats.subscription_count, 0);
        assert!(stats.history_depth.is_empty());
        assert!(stats.metrics.is_empty());
        assert_eq!(stats.queue_depths.total(), 0);
        assert!(bus.retry_policy("load").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_discards_retries_queued_before_start() {
        let bus = MessageBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        bus.subscribe("save", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::failed("offline"))
        });
        bus.set_retry_policy("save", RetryPolicy::new(2, 10));
        bus.publish("save", json!(1), Priority::Critical);

        bus.cleanup();
        let workers = bus.start().unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        workers.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(bus.stats().metrics.is_empty());
        assert_eq!(bus.stats().queue_depths.total(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let bus = MessageBus::default();
        let workers = bus.start().unwrap();
        assert!(matches!(bus.start(), Err(BusError::AlreadyStarted)));
        workers.shutdown().await;
    }

    #[test]
    fn test_usable_through_port() {
        let bus: Arc<dyn MessageBusApi> = Arc::new(MessageBus::default());
        let token = bus.subscribe("load", crate::domain::handler_fn(|_| Ok(())));
        bus.publish("load", json!(1), Priority::Critical);

        assert_eq!(bus.stats().metrics["load"].total_messages, 1);
        assert!(bus.unsubscribe("load", token));
        assert!(!bus.unsubscribe("load", token));
    }
}
