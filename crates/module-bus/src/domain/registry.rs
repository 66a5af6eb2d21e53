//! # Channel Registry
//!
//! Maps event names to their subscribers and issues subscription tokens.
//!
//! Dispatch never iterates the live map: it takes a snapshot, so a handler
//! added or removed while a dispatch is in flight only affects later
//! dispatches.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::errors::HandlerError;
use super::message::Payload;

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&Payload) -> Result<(), HandlerError> + Send + Sync>;

/// Box a closure as a `Handler`.
///
/// Going through a generic bound lets the compiler infer the closure's
/// argument and return types.
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(&Payload) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Opaque handle returned by `subscribe`, required to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionToken(Uuid);

impl SubscriptionToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered handler, as seen by the dispatcher.
#[derive(Clone)]
pub struct Subscription {
    pub token: SubscriptionToken,
    pub event: Arc<str>,
    pub handler: Handler,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Thread-safe event → subscribers map.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, HashMap<SubscriptionToken, Subscription>>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Always succeeds.
    pub fn subscribe(&self, event: &str, handler: Handler) -> SubscriptionToken {
        let token = SubscriptionToken::new();
        let subscription = Subscription {
            token,
            event: Arc::from(event),
            handler,
        };
        self.channels
            .write()
            .entry(event.to_string())
            .or_default()
            .insert(token, subscription);
        debug!(event, %token, "Subscription registered");
        token
    }

    /// Remove the subscription. Returns `false` if it was not registered.
    ///
    /// A channel whose last subscriber leaves is dropped from the map.
    pub fn unsubscribe(&self, event: &str, token: SubscriptionToken) -> bool {
        let mut channels = self.channels.write();
        let Some(subscribers) = channels.get_mut(event) else {
            return false;
        };
        let removed = subscribers.remove(&token).is_some();
        if subscribers.is_empty() {
            channels.remove(event);
        }
        if removed {
            debug!(event, %token, "Subscription removed");
        }
        removed
    }

    /// Point-in-time copy of the subscribers of `event`.
    #[must_use]
    pub fn snapshot(&self, event: &str) -> Vec<Subscription> {
        self.channels
            .read()
            .get(event)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.channels.read().values().map(HashMap::len).sum()
    }

    pub fn clear(&self) {
        self.channels.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        handler_fn(|_| Ok(()))
    }

    #[test]
    fn test_subscribe_before_publish() {
        let registry = ChannelRegistry::new();
        let token = registry.subscribe("load", noop());

        let snapshot = registry.snapshot("load");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].token, token);
        assert_eq!(&*snapshot[0].event, "load");
    }

    #[test]
    fn test_tokens_are_unique() {
        let registry = ChannelRegistry::new();
        let a = registry.subscribe("load", noop());
        let b = registry.subscribe("load", noop());
        assert_ne!(a, b);
        assert_eq!(registry.subscription_count(), 2);
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn test_double_unsubscribe() {
        let registry = ChannelRegistry::new();
        let token = registry.subscribe("load", noop());

        assert!(registry.unsubscribe("load", token));
        assert!(!registry.unsubscribe("load", token));
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_unsubscribe_requires_matching_event() {
        let registry = ChannelRegistry::new();
        let token = registry.subscribe("load", noop());
        registry.subscribe("save", noop());

        assert!(!registry.unsubscribe("save", token));
        assert_eq!(registry.subscription_count(), 2);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = ChannelRegistry::new();
        registry.subscribe("load", noop());
        let snapshot = registry.snapshot("load");

        registry.subscribe("load", noop());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot("load").len(), 2);
    }

    #[test]
    fn test_clear() {
        let registry = ChannelRegistry::new();
        registry.subscribe("a", noop());
        registry.subscribe("b", noop());
        registry.clear();
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.subscription_count(), 0);
    }
}
