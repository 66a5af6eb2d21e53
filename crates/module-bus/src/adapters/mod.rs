//! Adapters layer: typed and stream-based access on top of the bus.

pub mod stream;
pub mod typed;

pub use stream::EventStream;
