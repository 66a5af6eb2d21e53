//! Alerts: surfaces permanent delivery failures and notable application
//! events in the log.

use module_bus::{handler_fn, MessageBusApi, SubscriptionToken, MESSAGE_ERROR_EVENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::events::{BALANCE_UPDATED, SCENE_READY};

pub struct Alerts {
    bus: Arc<dyn MessageBusApi>,
    tokens: Vec<(&'static str, SubscriptionToken)>,
    failures: Arc<AtomicUsize>,
}

impl Alerts {
    pub fn attach(bus: Arc<dyn MessageBusApi>) -> Self {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);

        let mut tokens = Vec::with_capacity(3);
        tokens.push((
            MESSAGE_ERROR_EVENT,
            bus.subscribe(
                MESSAGE_ERROR_EVENT,
                handler_fn(move |payload| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        event = %payload["event"],
                        error = %payload["error"],
                        "Delivery failed permanently"
                    );
                    Ok(())
                }),
            ),
        ));
        for event in [SCENE_READY, BALANCE_UPDATED] {
            let token = bus.subscribe(
                event,
                handler_fn(move |payload| {
                    info!(event, %payload, "Application event");
                    Ok(())
                }),
            );
            tokens.push((event, token));
        }

        Self {
            bus,
            tokens,
            failures,
        }
    }

    /// `message-error` events seen so far.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn detach(self) {
        for (event, token) in self.tokens {
            self.bus.unsubscribe(event, token);
        }
    }
}
