//! # Self-Tuning Optimizer
//!
//! Periodically aggregates metrics across all events and adapts the bus:
//!
//! | Condition | Action |
//! |-----------|--------|
//! | global error rate > `error_rate_threshold` | loosen every retry policy |
//! | global avg latency > `latency_threshold_ms` | force low-tier batch drain |
//! | low depth > `low_queue_threshold` | force low-tier batch drain |
//! | any low backlog at all | flush it, so no low message is stranded |

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::domain::{GlobalMetrics, MetricsStore, RetryPolicyTable};
use crate::service::scheduler::Scheduler;

/// Why the optimizer asked for a low-tier drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrainTrigger {
    Latency,
    Backlog,
    Flush,
}

/// What one optimizer pass observed and did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub global: GlobalMetrics,
    pub policies_loosened: usize,
    pub low_drain: Option<DrainTrigger>,
}

#[derive(Clone)]
pub struct Optimizer {
    metrics: Arc<MetricsStore>,
    policies: Arc<RetryPolicyTable>,
    scheduler: Arc<Scheduler>,
    config: BusConfig,
}

impl Optimizer {
    pub fn new(
        metrics: Arc<MetricsStore>,
        policies: Arc<RetryPolicyTable>,
        scheduler: Arc<Scheduler>,
        config: BusConfig,
    ) -> Self {
        Self {
            metrics,
            policies,
            scheduler,
            config,
        }
    }

    /// One optimization pass.
    pub fn run_once(&self) -> OptimizationReport {
        let global = self.metrics.aggregate();
        let mut report = OptimizationReport {
            global,
            policies_loosened: 0,
            low_drain: None,
        };

        let error_rate = global.error_rate();
        if error_rate > self.config.error_rate_threshold {
            report.policies_loosened = self
                .policies
                .loosen_all(self.config.max_retries_ceiling, self.config.max_backoff_ms);
            info!(
                error_rate,
                loosened = report.policies_loosened,
                "Error rate above threshold, loosening retry policies"
            );
        }

        let low_depth = self.scheduler.low_depth();
        let trigger = if global.avg_latency_ms > self.config.latency_threshold_ms {
            Some(DrainTrigger::Latency)
        } else if low_depth > self.scheduler.low_queue_threshold() {
            Some(DrainTrigger::Backlog)
        } else if low_depth > 0 {
            Some(DrainTrigger::Flush)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            if self.scheduler.request_low_drain() {
                info!(
                    ?trigger,
                    low_depth,
                    avg_latency_ms = global.avg_latency_ms,
                    "Forcing low-tier batch drain"
                );
                report.low_drain = Some(trigger);
            }
        }

        debug!(
            total = global.total_messages,
            errors = global.errors,
            avg_latency_ms = global.avg_latency_ms,
            "Optimizer pass complete"
        );
        report
    }

    /// Run `run_once` every `optimizer_interval_ms` until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.optimizer_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first pass
        // sees a full interval of traffic.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown handle dropped, stopping optimizer");
                    }
                    break;
                }
            }
        }
        debug!("Optimizer stopped");
    }
}
