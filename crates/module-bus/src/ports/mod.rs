//! Ports layer - Inbound and outbound interfaces.

pub mod inbound;
pub mod outbound;

pub use inbound::MessageBusApi;
pub use outbound::{ManualTimeSource, SystemTimeSource, TimeSource};
