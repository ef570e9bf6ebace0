//! IO modules - external system interfaces
//!
//! - `sqs` - SQS long-poll receive and delete behind the `MessageQueue` trait
//! - `hue` - Hue bridge REST client behind the `SwitchControl` trait
//! - `mock_bridge` - in-process HTTP server emulating the Hue bridge

pub mod hue;
pub mod mock_bridge;
pub mod sqs;

// Re-export commonly used types
pub use hue::{ApiError, BridgeError, HueBridge, SwitchControl};
pub use mock_bridge::{MockBridge, MockLight, StateChange};
pub use sqs::{MessageQueue, QueueError, SqsQueue};
