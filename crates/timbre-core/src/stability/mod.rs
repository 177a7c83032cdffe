//! Stability control - real-time guarantees and graceful degradation
//!
//! - [`StabilityController`]: SCHED_FIFO elevation, mlock, and the
//!   Normal/Degraded state machine (precision + concealment)
//! - [`DegradePolicy`]: debounced decision logic over latency samples
//! - [`Watchdog`]: the low-priority loop applying the policy every ~10 ms

mod controller;
mod error;
mod policy;
mod state;
pub mod watchdog;

pub use controller::StabilityController;
#[cfg(all(test, unix))]
pub(crate) use controller::scheduling_of;
pub use error::{PinningError, PinningResult};
pub use policy::{DegradePolicy, Transition, DEFAULT_RESTORE_AFTER_PACKETS};
pub use state::{EngineState, Precision, StabilityMode};
pub use watchdog::{
    drain_latencies, latency_channel, LatencyReporter, Watchdog, DEFAULT_POLL_INTERVAL,
    LATENCY_QUEUE_CAPACITY,
};
