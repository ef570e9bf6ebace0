//! Services - the poll loop, the actuator and the loop joining them
//!
//! - `poller` - long-polls the queue, deletes and forwards messages
//! - `mill` - one on/wait/off cycle on the switch
//! - `driver` - runs a mill cycle per forwarded message, one at a time

pub mod driver;
pub mod mill;
pub mod poller;

#[cfg(test)]
mod fakes;

// Re-export commonly used types
pub use driver::{CycleOutcome, Driver};
pub use mill::{ActuationError, Mill};
pub use poller::QueuePoller;
