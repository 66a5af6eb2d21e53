//! # Priority Queues
//!
//! Four FIFO queues, one per tier, each behind its own lock so publishers of
//! different tiers never contend.
//!
//! ```text
//!   critical ─── pop(Critical): drained by the publishing caller
//!   high     ─┬─ pop_ready(): highest non-empty of these, one message
//!   normal   ─┘
//!   low      ─── take_low_batch(): up to `batch_size`, once a drain is requested
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::message::{Message, Priority};

#[derive(Debug, Default)]
struct TierQueue {
    messages: VecDeque<Message>,
    drain_requested: bool,
}

/// Per-tier FIFO queues.
#[derive(Debug, Default)]
pub struct PriorityQueues {
    tiers: [Mutex<TierQueue>; 4],
}

impl PriorityQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the message's tier. Returns the tier depth after the push.
    pub fn enqueue(&self, message: Message) -> usize {
        let mut tier = self.tiers[message.priority().index()].lock();
        tier.messages.push_back(message);
        tier.messages.len()
    }

    /// Pop the oldest message of exactly `priority`.
    pub fn pop(&self, priority: Priority) -> Option<Message> {
        self.tiers[priority.index()].lock().messages.pop_front()
    }

    /// Pop the oldest message of the highest non-empty scheduled tier
    /// (`high`, then `normal`).
    pub fn pop_ready(&self) -> Option<Message> {
        [Priority::High, Priority::Normal]
            .into_iter()
            .find_map(|tier| self.pop(tier))
    }

    /// Ask for the low tier to be drained in batches.
    ///
    /// Returns `false` when there is nothing to drain.
    pub fn request_low_drain(&self) -> bool {
        let mut low = self.tiers[Priority::Low.index()].lock();
        low.drain_requested = !low.messages.is_empty();
        low.drain_requested
    }

    /// Enqueue a low message and request a drain if the tier is deeper than
    /// `threshold`. Returns whether a drain is now pending.
    pub fn enqueue_low(&self, message: Message, threshold: usize) -> bool {
        debug_assert_eq!(message.priority(), Priority::Low);
        let mut low = self.tiers[Priority::Low.index()].lock();
        low.messages.push_back(message);
        if low.messages.len() > threshold {
            low.drain_requested = true;
        }
        low.drain_requested
    }

    #[must_use]
    pub fn low_drain_requested(&self) -> bool {
        self.tiers[Priority::Low.index()].lock().drain_requested
    }

    /// Take the next low batch if a drain was requested.
    ///
    /// The request is cleared under the same lock once the tier is empty, so
    /// a concurrent `enqueue_low` can never have its request lost.
    pub fn take_low_batch(&self, batch_size: usize) -> Vec<Message> {
        let mut low = self.tiers[Priority::Low.index()].lock();
        if !low.drain_requested {
            return Vec::new();
        }
        let count = batch_size.min(low.messages.len());
        let batch: Vec<Message> = low.messages.drain(..count).collect();
        if low.messages.is_empty() {
            low.drain_requested = false;
        }
        batch
    }

    #[must_use]
    pub fn depth(&self, priority: Priority) -> usize {
        self.tiers[priority.index()].lock().messages.len()
    }

    /// Depths in `Priority::DESCENDING` order.
    #[must_use]
    pub fn depths(&self) -> [usize; 4] {
        Priority::DESCENDING.map(|tier| self.depth(tier))
    }

    pub fn clear(&self) {
        for tier in &self.tiers {
            let mut tier = tier.lock();
            tier.messages.clear();
            tier.drain_requested = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(event: &str, priority: Priority) -> Message {
        Message::new(event, json!(null), priority, 0)
    }

    #[test]
    fn test_pop_ready_prefers_higher_tiers() {
        let queues = PriorityQueues::new();
        queues.enqueue(msg("n1", Priority::Normal));
        queues.enqueue(msg("h1", Priority::High));
        queues.enqueue(msg("n2", Priority::Normal));
        queues.enqueue(msg("h2", Priority::High));

        let order: Vec<String> = std::iter::from_fn(|| queues.pop_ready())
            .map(|m| m.event().to_string())
            .collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
    }

    #[test]
    fn test_critical_is_not_scheduled() {
        let queues = PriorityQueues::new();
        queues.enqueue(msg("c1", Priority::Critical));
        assert!(queues.pop_ready().is_none());
        assert_eq!(queues.pop(Priority::Critical).unwrap().event(), "c1");
    }

    #[test]
    fn test_pop_ready_ignores_low() {
        let queues = PriorityQueues::new();
        queues.enqueue(msg("bg", Priority::Low));
        assert!(queues.pop_ready().is_none());
        assert_eq!(queues.depth(Priority::Low), 1);
    }

    #[test]
    fn test_low_accumulates_until_threshold() {
        let queues = PriorityQueues::new();
        for i in 0..10 {
            assert!(!queues.enqueue_low(msg(&format!("bg{i}"), Priority::Low), 10));
        }
        assert!(queues.take_low_batch(5).is_empty());

        assert!(queues.enqueue_low(msg("bg10", Priority::Low), 10));
        assert!(queues.low_drain_requested());
    }

    #[test]
    fn test_low_batches_in_fifo_order() {
        let queues = PriorityQueues::new();
        for i in 0..12 {
            queues.enqueue_low(msg(&format!("bg{i}"), Priority::Low), 10);
        }

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let batch = queues.take_low_batch(5);
            (!batch.is_empty()).then_some(batch.len())
        })
        .collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert!(!queues.low_drain_requested());
    }

    #[test]
    fn test_request_low_drain_on_empty_tier() {
        let queues = PriorityQueues::new();
        assert!(!queues.request_low_drain());

        queues.enqueue_low(msg("bg", Priority::Low), 10);
        assert!(queues.request_low_drain());
        let batch = queues.take_low_batch(5);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event(), "bg");
    }

    #[test]
    fn test_depths_and_clear() {
        let queues = PriorityQueues::new();
        queues.enqueue(msg("c", Priority::Critical));
        queues.enqueue(msg("n", Priority::Normal));
        queues.enqueue_low(msg("l", Priority::Low), 0);
        assert_eq!(queues.depths(), [1, 0, 1, 1]);

        queues.clear();
        assert_eq!(queues.depths(), [0, 0, 0, 0]);
        assert!(!queues.low_drain_requested());
    }
}
