//! Domain models - core types shared by the poller, actuator and driver
//!
//! - `QueueMessage` - a message taken off the queue, with its delete handle
//! - `SwitchIndex` / `SwitchState` / `SwitchInfo` - the controlled switch
//! - `CycleReport` - outcome of one on-wait-off cycle

pub mod types;

pub use types::{CycleReport, QueueMessage, SwitchIndex, SwitchInfo, SwitchState};
