//! Domain layer: pure data structures of the bus, no runtime dependencies.

pub mod errors;
pub mod history;
pub mod message;
pub mod metrics;
pub mod policy;
pub mod queues;
pub mod registry;
pub mod retry_state;
pub mod stats;

pub use errors::*;
pub use history::*;
pub use message::*;
pub use metrics::*;
pub use policy::*;
pub use queues::*;
pub use registry::*;
pub use retry_state::*;
pub use stats::*;
