//! In-memory fakes for the queue and the switch, shared by the service tests

use crate::domain::types::{QueueMessage, SwitchIndex, SwitchInfo, SwitchState};
use crate::io::hue::{ApiError, BridgeError, SwitchControl};
use crate::io::sqs::{MessageQueue, QueueError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

pub fn message(id: &str) -> QueueMessage {
    QueueMessage::new(
        Some(id.to_string()),
        Some(format!("handle-{}", id)),
        Some(format!("{{\"id\":\"{}\"}}", id)),
    )
}

#[derive(Default)]
struct FakeQueueState {
    script: VecDeque<Result<Vec<QueueMessage>, QueueError>>,
    receive_calls: Vec<(i32, Duration)>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
}

/// Queue that replays a script of receive results, then idles like an empty long-poll
#[derive(Default)]
pub struct FakeQueue {
    state: Mutex<FakeQueueState>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_messages(&self, messages: Vec<QueueMessage>) {
        self.state.lock().script.push_back(Ok(messages));
    }

    pub fn push_error(&self, error: QueueError) {
        self.state.lock().script.push_back(Err(error));
    }

    pub fn fail_delete(&self, receipt_handle: &str) {
        self.state.lock().failing_deletes.insert(receipt_handle.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn receive_calls(&self) -> Vec<(i32, Duration)> {
        self.state.lock().receive_calls.clone()
    }
}

#[async_trait]
impl MessageQueue for FakeQueue {
    fn queue_url(&self) -> &str {
        "fake://queue"
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let next = {
            let mut state = self.state.lock();
            state.receive_calls.push((max_messages, wait));
            state.script.pop_front()
        };

        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(receipt_handle) {
            return Err(QueueError::Delete("access denied".to_string()));
        }
        state.deleted.push(receipt_handle.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeSwitchState {
    commands: Vec<(SwitchState, Instant)>,
    lookups: u32,
    lookup_failures: u32,
    fail_on: bool,
    fail_off: bool,
}

/// Switch that records every command with the (tokio) time it was issued
#[derive(Default)]
pub struct FakeSwitch {
    state: Mutex<FakeSwitchState>,
}

impl FakeSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` lookups fail
    pub fn fail_lookups(&self, count: u32) {
        self.state.lock().lookup_failures = count;
    }

    pub fn fail_on(&self) {
        self.state.lock().fail_on = true;
    }

    pub fn fail_off(&self) {
        self.state.lock().fail_off = true;
    }

    pub fn commands(&self) -> Vec<(SwitchState, Instant)> {
        self.state.lock().commands.clone()
    }

    pub fn lookups(&self) -> u32 {
        self.state.lock().lookups
    }
}

#[async_trait]
impl SwitchControl for FakeSwitch {
    async fn lookup(&self, index: SwitchIndex) -> Result<SwitchInfo, BridgeError> {
        let mut state = self.state.lock();
        state.lookups += 1;
        if state.lookup_failures > 0 {
            state.lookup_failures -= 1;
            return Err(BridgeError::Api(ApiError {
                error_type: 3,
                address: format!("/lights/{}", index),
                description: format!("resource, /lights/{}, not available", index),
            }));
        }

        let on = matches!(state.commands.last(), Some((SwitchState::On, _)));
        Ok(SwitchInfo {
            index,
            name: "fake plug".to_string(),
            state: SwitchState::from(on),
            reachable: true,
        })
    }

    async fn set_state(&self, _index: SwitchIndex, switch_state: SwitchState) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        let failing = match switch_state {
            SwitchState::On => state.fail_on,
            SwitchState::Off => state.fail_off,
        };
        if failing {
            return Err(BridgeError::Status(503));
        }
        state.commands.push((switch_state, Instant::now()));
        Ok(())
    }
}
