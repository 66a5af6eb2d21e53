//! # Background Workers
//!
//! The tasks spawned by `MessageBus::start`:
//!
//! - **scheduler**: drains high, then normal, then low batches into the
//!   dispatcher, yielding to the runtime between units of work.
//! - **retry**: runs retry jobs and their backoff waits.
//! - **optimizer**: periodic self-tuning pass (if enabled).
//!
//! All of them watch a single shutdown channel. Dropping `BusWorkers`
//! without calling `shutdown()` closes that channel; each task then logs a
//! warning and exits.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::bus::MessageBus;
use crate::service::dispatcher::{DispatchReport, Dispatcher};
use crate::service::retry::RetryJob;
use crate::service::scheduler::Scheduler;

/// Handles to the running background tasks of one bus.
///
/// Prefer `shutdown()`: dropping the handle also stops the tasks, but does
/// not wait for them and logs a warning from each.
pub struct BusWorkers {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BusWorkers {
    pub(crate) fn spawn(bus: &MessageBus, jobs: mpsc::UnboundedReceiver<RetryJob>) -> Self {
        let core = &bus.core;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(3);

        handles.push(tokio::spawn(run_scheduler(
            Arc::clone(&core.scheduler),
            Arc::clone(&core.dispatcher),
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(
            core.retries.clone().run(jobs, shutdown_rx.clone()),
        ));
        if core.config.optimizer_enabled {
            handles.push(tokio::spawn(bus.optimizer().run(shutdown_rx)));
        }

        info!(
            tasks = handles.len(),
            optimizer = core.config.optimizer_enabled,
            "Bus workers started"
        );
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// `true` while every task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handles.iter().all(|handle| !handle.is_finished())
    }

    /// Signal shutdown and wait for every task to exit.
    ///
    /// Messages still queued stay queued; in-flight retries are abandoned.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Bus worker ended abnormally");
            }
        }
        info!("Bus workers stopped");
    }
}

/// Scheduler loop.
///
/// Each iteration hands over one high/normal message or one low batch, then
/// yields, so a higher-tier message published meanwhile is picked up before
/// the next lower-tier one. Delivery counts are summarised each time the
/// queues run dry.
pub(crate) async fn run_scheduler(
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut since_idle = DispatchReport::default();
    let mut messages = 0usize;

    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Some(message) = scheduler.next_ready() {
            since_idle += dispatcher.dispatch(&message);
            messages += 1;
            tokio::task::yield_now().await;
            continue;
        }

        let batch = scheduler.next_low_batch();
        if !batch.is_empty() {
            let mut report = DispatchReport::default();
            for message in &batch {
                report += dispatcher.dispatch(message);
            }
            debug!(
                size = batch.len(),
                delivered = report.delivered,
                failed = report.failed,
                "Low-priority batch dispatched"
            );
            since_idle += report;
            messages += batch.len();
            tokio::task::yield_now().await;
            continue;
        }

        if messages > 0 {
            debug!(
                messages,
                delivered = since_idle.delivered,
                failed = since_idle.failed,
                "Queues drained"
            );
            since_idle = DispatchReport::default();
            messages = 0;
        }

        tokio::select! {
            _ = scheduler.wait() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    warn!("Shutdown handle dropped, stopping scheduler");
                }
                break;
            }
        }
    }
    debug!("Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_dropped_shutdown_handle_stops_scheduler() {
        let bus = MessageBus::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_scheduler(
            Arc::clone(&bus.core.scheduler),
            Arc::clone(&bus.core.dispatcher),
            shutdown_rx,
        ));

        drop(shutdown_tx);

        let finished = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_dropped_workers_stop_every_task() {
        let bus = MessageBus::default();
        let workers = bus.start().unwrap();
        let handles: Vec<_> = workers.handles.iter().map(JoinHandle::abort_handle).collect();

        drop(workers);

        tokio::time::timeout(Duration::from_secs(1), async {
            while handles.iter().any(|handle| !handle.is_finished()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("Workers should exit once the handle is dropped");
    }

    #[tokio::test]
    async fn test_scheduler_keeps_dispatching_after_failures() {
        let bus = MessageBus::default();
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&delivered);
        bus.subscribe("tick", move |payload| {
            d.fetch_add(1, Ordering::SeqCst);
            if payload == &json!(0) {
                Err(crate::domain::HandlerError::failed("first tick"))
            } else {
                Ok(())
            }
        });
        let workers = bus.start().unwrap();

        for i in 0..3 {
            bus.publish("tick", json!(i), Priority::High);
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while delivered.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("All ticks should be dispatched");
        workers.shutdown().await;
        assert_eq!(bus.stats().metrics["tick"].errors, 1);
    }
}
