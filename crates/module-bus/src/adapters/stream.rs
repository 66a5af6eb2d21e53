//! # Event Stream
//!
//! Pull-based subscription: payloads published on one event are forwarded
//! into an unbounded channel and read back as a `tokio_stream::Stream`.
//!
//! Dropping the stream unsubscribes it.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

use crate::domain::{HandlerError, Payload, SubscriptionToken};
use crate::service::MessageBus;

/// A subscription whose payloads are read as a stream.
pub struct EventStream {
    bus: MessageBus,
    event: String,
    token: SubscriptionToken,
    receiver: mpsc::UnboundedReceiver<Payload>,
}

impl EventStream {
    /// Receive the next payload.
    ///
    /// Returns `None` once the bus has been cleaned up and every buffered
    /// payload was read.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.receiver.recv().await
    }

    /// Next payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }
}

impl Stream for EventStream {
    type Item = Payload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.event, self.token);
        debug!(event = %self.event, token = %self.token, "Event stream dropped");
    }
}

impl MessageBus {
    /// Subscribe to `event` and read its payloads as a stream.
    pub fn subscribe_stream(&self, event: &str) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = self.subscribe(event, move |payload| {
            sender
                .send(payload.clone())
                .map_err(|_| HandlerError::Closed)
        });
        EventStream {
            bus: self.clone(),
            event: event.to_string(),
            token,
            receiver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stream_receives_payloads() {
        let bus = MessageBus::default();
        let mut stream = bus.subscribe_stream("price");

        bus.publish("price", json!(1), Priority::Critical);
        bus.publish("price", json!(2), Priority::Critical);

        let first = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout");
        assert_eq!(first, Some(json!(1)));
        assert_eq!(stream.recv().await, Some(json!(2)));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = MessageBus::default();
        let stream = bus.subscribe_stream("price");
        assert_eq!(stream.event(), "price");
        assert_eq!(bus.stats().subscription_count, 1);

        drop(stream);
        assert_eq!(bus.stats().subscription_count, 0);
    }

    #[test]
    fn test_stream_ends_after_cleanup() {
        let bus = MessageBus::default();
        let mut stream = bus.subscribe_stream("price");
        bus.publish("price", json!(1), Priority::Critical);

        // Cleanup drops the handler, and with it the sending half.
        bus.cleanup();

        assert_eq!(stream.try_recv(), Some(json!(1)));
        assert_eq!(stream.try_recv(), None);
    }
}
