//! SQS queue client
//!
//! The poller only needs two calls, receive and delete, so the queue sits
//! behind the `MessageQueue` trait and tests can swap in a fake.

use crate::domain::types::QueueMessage;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to receive message: {0}")]
    Receive(String),
    #[error("failed to delete message: {0}")]
    Delete(String),
}

/// A queue that can be long-polled and acknowledged
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue identifier for logging
    fn queue_url(&self) -> &str;

    /// Receive up to `max_messages`, waiting server-side up to `wait` for one to arrive
    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete a message by its receipt handle
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: MessageQueue + ?Sized> MessageQueue for Arc<T> {
    fn queue_url(&self) -> &str {
        (**self).queue_url()
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        (**self).receive(max_messages, wait).await
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        (**self).delete(receipt_handle).await
    }
}

/// AWS SQS implementation of [`MessageQueue`]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self { client, queue_url: queue_url.into() }
    }

    /// Build a client from the default AWS provider chain
    /// (environment, shared config and credentials files, instance metadata)
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        debug!(region = ?sdk_config.region(), "aws_config_loaded");
        Self::new(Client::new(&sdk_config), queue_url)
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage::new(m.message_id, m.receipt_handle, m.body))
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}
