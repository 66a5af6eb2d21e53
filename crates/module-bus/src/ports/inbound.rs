//! # Inbound Port - MessageBusApi
//!
//! The only surface collaborators (UI layer, renderer, chain client) use.
//!
//! | Method | Effect |
//! |--------|--------|
//! | `subscribe` | Register a handler, get a token |
//! | `unsubscribe` | Remove a handler; `false` if already gone |
//! | `publish` | Enqueue (critical: dispatch before returning) |
//! | `stats` | Snapshot of registry, history, metrics and queues |
//! | `cleanup` | Clear every table; used at teardown |

use crate::domain::{BusStats, Handler, Payload, Priority, SubscriptionToken};

/// Primary API of the bus.
///
/// Object safe so collaborators can hold an `Arc<dyn MessageBusApi>`.
///
/// # Example
///
/// ```rust,ignore
/// use module_bus::{MessageBusApi, Priority};
///
/// fn announce(bus: &dyn MessageBusApi) {
///     bus.publish("scene-loaded", serde_json::json!({"id": 7}), Priority::High);
/// }
/// ```
pub trait MessageBusApi: Send + Sync {
    fn subscribe(&self, event: &str, handler: Handler) -> SubscriptionToken;

    fn unsubscribe(&self, event: &str, token: SubscriptionToken) -> bool;

    /// Fire-and-forget publish. Handler failures are never reported here.
    fn publish(&self, event: &str, payload: Payload, priority: Priority);

    fn stats(&self) -> BusStats;

    fn cleanup(&self);
}
