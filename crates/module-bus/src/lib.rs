//! # Module Bus
//!
//! In-process, priority-aware publish/subscribe bus that decouples
//! independently developed application modules (UI layer, renderer, chain
//! client). Publishers and subscribers only share event names.
//!
//! ## Priority Tiers
//!
//! | Tier | Delivery |
//! |------|----------|
//! | `critical` | dispatched before `publish` returns |
//! | `high` | next scheduler turn, ahead of everything below |
//! | `normal` | after every queued `high` message |
//! | `low` | batches of `batch_size`, once depth exceeds `low_queue_threshold` or the optimizer flushes |
//!
//! Priority strictly dominates arrival order; within a tier delivery is FIFO.
//!
//! ## Failure Handling
//!
//! ```text
//! handler fails ──→ policy? ──no──────────────────────────→ message-error
//!                      │                                        ↑
//!                      └─yes─→ retry n after backoff_ms * n ────┤ (all retries failed)
//!                                     │
//!                                     └── success ──→ done
//! ```
//!
//! One failing handler never prevents the other subscribers of the same
//! event from receiving the message. Handler panics are caught.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/typed.rs  - serde encode/decode on publish/subscribe  │
//! │  adapters/stream.rs - EventStream (tokio_stream::Stream)        │
//! │  service/           - MessageBus, scheduler, dispatcher,        │
//! │                       retry manager, optimizer, workers         │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - MessageBusApi trait                        │
//! │  ports/outbound.rs - TimeSource trait                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/registry.rs - ChannelRegistry, SubscriptionToken        │
//! │  domain/queues.rs   - PriorityQueues (four FIFO tiers)          │
//! │  domain/policy.rs   - RetryPolicy, RetryPolicyTable             │
//! │  domain/metrics.rs  - MetricsStore, PerformanceMetric           │
//! │  domain/history.rs  - HistoryRing, HistoryStore                 │
//! │  domain/errors.rs   - HandlerError, BusError                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let bus = MessageBus::new(BusConfig::from_env())?;
//! let workers = bus.start()?;
//!
//! bus.subscribe("scene-loaded", |payload| {
//!     tracing::info!(%payload, "scene ready");
//!     Ok(())
//! });
//! bus.publish("scene-loaded", json!({"id": 7}), Priority::High);
//!
//! workers.shutdown().await;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::EventStream;
pub use config::{BusConfig, ConfigError, MAX_HISTORY_CAPACITY};
pub use domain::*;
pub use ports::*;
pub use service::*;

/// Entries kept per event in the history ring.
pub const HISTORY_CAPACITY: usize = 100;

/// Event published when a delivery fails permanently.
///
/// Payload: `{"event": <original event>, "error": <message>, "data": <original payload>}`.
pub const MESSAGE_ERROR_EVENT: &str = "message-error";
