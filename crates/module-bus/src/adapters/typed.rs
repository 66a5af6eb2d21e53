//! # Typed Adapters
//!
//! Serde-backed helpers so collaborators can exchange their own types while
//! the bus itself only carries JSON values.
//!
//! A payload that fails to decode counts as a handler failure
//! (`HandlerError::Decode`) and goes through the normal retry path.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{BusError, HandlerError, Priority, SubscriptionToken};
use crate::service::MessageBus;

impl MessageBus {
    /// Subscribe with a handler that receives `T` decoded from the payload.
    pub fn subscribe_typed<T, F>(&self, event: &str, handler: F) -> SubscriptionToken
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(event, move |payload| {
            let value = T::deserialize(payload)?;
            handler(value)
        })
    }

    /// Encode `value` and publish it.
    pub fn publish_typed<T>(
        &self,
        event: &str,
        value: &T,
        priority: Priority,
    ) -> Result<(), BusError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(value)?;
        self.publish(event, payload, priority);
        Ok(())
    }
}
