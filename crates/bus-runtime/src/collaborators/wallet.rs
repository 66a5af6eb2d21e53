//! Wallet: syncs balances from a chain endpoint that may be flaky.
//!
//! The endpoint is simulated: it refuses the first `outage` requests, which
//! exercises the bus retry path.

use module_bus::{handler_fn, HandlerError, MessageBusApi, Priority, SubscriptionToken};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::events::{BALANCE_UPDATED, WALLET_SYNC};

pub struct Wallet {
    bus: Arc<dyn MessageBusApi>,
    token: SubscriptionToken,
    requests: Arc<AtomicU32>,
}

impl Wallet {
    pub fn attach(bus: Arc<dyn MessageBusApi>, outage: u32) -> Self {
        let publisher = Arc::clone(&bus);
        let requests = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&requests);
        let token = bus.subscribe(
            WALLET_SYNC,
            handler_fn(move |payload| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                if attempt < outage {
                    debug!(attempt, "Chain endpoint unavailable");
                    return Err(HandlerError::failed("chain endpoint unavailable"));
                }
                let account = payload["account"].as_str().unwrap_or("default");
                let balance = 1_000 + u64::from(attempt);
                info!(account, balance, "Balance synced");
                publisher.publish(
                    BALANCE_UPDATED,
                    json!({"account": account, "balance": balance}),
                    Priority::Normal,
                );
                Ok(())
            }),
        );
        Self {
            bus,
            token,
            requests,
        }
    }

    /// Requests made to the chain endpoint, retries included.
    #[must_use]
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn detach(self) -> bool {
        self.bus.unsubscribe(WALLET_SYNC, self.token)
    }
}
