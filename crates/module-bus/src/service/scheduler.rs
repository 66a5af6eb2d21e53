//! # Priority Scheduler
//!
//! Decides when a queued message reaches the dispatcher.
//!
//! | Tier | Drained by | Granularity |
//! |------|------------|-------------|
//! | critical | publishing caller, before `publish` returns | exhaustive |
//! | high / normal | scheduler task | one message per yield point |
//! | low | scheduler task, once a drain is requested | `batch_size` per yield point |
//!
//! A lower tier is only considered once every higher-tier message queued at
//! that moment has been drained.

use parking_lot::ReentrantMutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::BusConfig;
use crate::domain::{Message, Priority, PriorityQueues, QueueDepths};

pub struct Scheduler {
    queues: PriorityQueues,
    wakeup: Notify,
    /// Serialises critical drains. Reentrant so a critical handler may itself
    /// publish a critical message.
    critical_lane: ReentrantMutex<()>,
    low_queue_threshold: usize,
    batch_size: usize,
}

impl Scheduler {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            queues: PriorityQueues::new(),
            wakeup: Notify::new(),
            critical_lane: ReentrantMutex::new(()),
            low_queue_threshold: config.low_queue_threshold,
            batch_size: config.batch_size,
        }
    }

    /// Append `message` to its tier and wake the scheduler task if needed.
    ///
    /// Critical messages are only queued here; the caller must follow up
    /// with `drain_critical`.
    pub fn enqueue(&self, message: Message) {
        match message.priority() {
            Priority::Critical => {
                self.queues.enqueue(message);
            }
            Priority::Low => {
                if self.queues.enqueue_low(message, self.low_queue_threshold) {
                    self.wakeup.notify_one();
                }
            }
            Priority::High | Priority::Normal => {
                self.queues.enqueue(message);
                self.wakeup.notify_one();
            }
        }
    }

    /// Dispatch every queued critical message on the calling thread.
    ///
    /// Returns once the critical tier is empty and no other caller is midway
    /// through dispatching one of its messages.
    pub fn drain_critical(&self, mut dispatch: impl FnMut(&Message)) -> usize {
        let _lane = self.critical_lane.lock();
        let mut drained = 0;
        while let Some(message) = self.queues.pop(Priority::Critical) {
            dispatch(&message);
            drained += 1;
        }
        drained
    }

    /// Next high/normal message, if any.
    pub fn next_ready(&self) -> Option<Message> {
        self.queues.pop_ready()
    }

    /// Next low batch, empty unless a drain was requested.
    pub fn next_low_batch(&self) -> Vec<Message> {
        self.queues.take_low_batch(self.batch_size)
    }

    /// Force batch draining of the low tier. Returns `false` if it is empty.
    pub fn request_low_drain(&self) -> bool {
        let requested = self.queues.request_low_drain();
        if requested {
            debug!(depth = self.queues.depth(Priority::Low), "Low tier drain requested");
            self.wakeup.notify_one();
        }
        requested
    }

    #[must_use]
    pub fn low_depth(&self) -> usize {
        self.queues.depth(Priority::Low)
    }

    #[must_use]
    pub fn low_queue_threshold(&self) -> usize {
        self.low_queue_threshold
    }

    #[must_use]
    pub fn depths(&self) -> QueueDepths {
        QueueDepths::from(self.queues.depths())
    }

    /// Wait until new work may be available.
    ///
    /// `Notify` keeps one permit, so a wakeup issued while the scheduler task
    /// was busy is not lost.
    pub async fn wait(&self) {
        self.wakeup.notified().await;
    }

    pub fn clear(&self) {
        self.queues.clear();
    }
}
