//! # Messages and Priorities
//!
//! A message is created by `publish` and lives until every subscriber has
//! seen it (including exhausted retries). It is never mutated once queued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque message payload.
///
/// Subscribers that want a concrete type decode it with serde, see
/// `MessageBus::subscribe_typed`.
pub type Payload = serde_json::Value;

/// Milliseconds since the Unix epoch (or since an arbitrary origin for
/// manual clocks).
pub type Timestamp = u64;

/// Urgency tier of a message.
///
/// The derived `Ord` follows declaration order, so `Low < Normal < High < Critical`
/// and a higher tier always wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background traffic, drained in batches.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Latency-sensitive traffic.
    High,
    /// Dispatched synchronously by the publishing caller.
    Critical,
}

impl Priority {
    /// All tiers, highest first. This is the scheduler's scan order.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Position of this tier in the scheduler's queue array.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published message.
///
/// Cloning is cheap: the event name and payload are reference counted so the
/// same message can be handed to every subscriber and to pending retries.
#[derive(Debug, Clone)]
pub struct Message {
    event: Arc<str>,
    payload: Arc<Payload>,
    enqueued_at: Timestamp,
    priority: Priority,
}

impl Message {
    pub fn new(event: &str, payload: Payload, priority: Priority, enqueued_at: Timestamp) -> Self {
        Self {
            event: Arc::from(event),
            payload: Arc::new(payload),
            enqueued_at,
            priority,
        }
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Shared handle to the payload, used by history and retries.
    #[must_use]
    pub fn shared_payload(&self) -> Arc<Payload> {
        Arc::clone(&self.payload)
    }

    #[must_use]
    pub fn enqueued_at(&self) -> Timestamp {
        self.enqueued_at
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }
}
