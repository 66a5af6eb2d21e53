//! Service layer: the runtime pieces that move messages through the bus.

pub mod bus;
pub mod dispatcher;
pub mod optimizer;
pub mod retry;
pub mod scheduler;
pub mod workers;

pub use bus::MessageBus;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use optimizer::{DrainTrigger, OptimizationReport, Optimizer};
pub use retry::{FailedDelivery, RetryJob, RetryManager};
pub use scheduler::Scheduler;
pub use workers::BusWorkers;
