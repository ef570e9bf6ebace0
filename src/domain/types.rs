//! Shared types for the mill bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Newtype wrapper for the bridge-side light index of the controlled switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SwitchIndex(pub u32);

impl std::fmt::Display for SwitchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message taken off the queue
///
/// The body is opaque: any message triggers one mill cycle.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    /// Local receive time (for hand-off delay measurement)
    pub received_at: Instant,
}

impl QueueMessage {
    pub fn new(
        message_id: Option<String>,
        receipt_handle: Option<String>,
        body: Option<String>,
    ) -> Self {
        Self { message_id, receipt_handle, body, received_at: Instant::now() }
    }

    /// Message id for logging, `-` when the service did not send one
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("-")
    }
}

/// Binary state of the controlled switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "on",
            SwitchState::Off => "off",
        }
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the bridge reports about a switch when it is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    pub index: SwitchIndex,
    pub name: String,
    pub state: SwitchState,
    pub reachable: bool,
}

/// Result of a completed mill cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub index: SwitchIndex,
    pub switch_name: String,
    /// Time between the ON and OFF commands completing
    pub on_duration: Duration,
}
