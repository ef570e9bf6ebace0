//! Queue poller - long-polls the queue and hands messages to the driver
//!
//! Each received message is deleted first and then forwarded, so a failed
//! actuation never causes re-delivery. A receive is only issued once the
//! hand-off slot is free. Receive and delete errors are logged
//! and the loop carries on with the next poll.

use crate::domain::types::QueueMessage;
use crate::infra::metrics::Metrics;
use crate::io::sqs::MessageQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Server-side wait per receive call
pub const RECEIVE_WAIT: Duration = Duration::from_secs(15);
/// Messages requested per receive call
pub const MAX_MESSAGES_PER_RECEIVE: i32 = 1;

pub struct QueuePoller<Q> {
    queue: Q,
    metrics: Arc<Metrics>,
}

impl<Q: MessageQueue> QueuePoller<Q> {
    pub fn new(queue: Q, metrics: Arc<Metrics>) -> Self {
        Self { queue, metrics }
    }

    /// Poll until shutdown is signalled or the driver side of the channel is gone
    pub async fn run(
        self,
        message_tx: mpsc::Sender<QueueMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(queue_url = %self.queue.queue_url(), "poller_started");

        'poll: loop {
            if *shutdown.borrow() {
                break 'poll;
            }

            // Only long-poll once the driver can take the message, so at most
            // one deleted message ever waits behind a running cycle
            let Some(slot) = next_slot(&message_tx, &mut shutdown).await else {
                break 'poll;
            };

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'poll;
                    }
                    continue 'poll;
                }
                result = self.queue.receive(MAX_MESSAGES_PER_RECEIVE, RECEIVE_WAIT) => result,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    self.metrics.record_receive_error();
                    error!(error = %e, "sqs_receive_failed");
                    continue 'poll;
                }
            };

            let mut slot = Some(slot);
            for message in messages {
                self.metrics.record_message_received();
                info!(
                    message_id = %message.id(),
                    body_len = %message.body.as_deref().map_or(0, str::len),
                    "sqs_message_received"
                );

                self.acknowledge(&message).await;

                let permit = match slot.take() {
                    Some(permit) => permit,
                    None => match next_slot(&message_tx, &mut shutdown).await {
                        Some(permit) => permit,
                        None => {
                            self.metrics.record_message_dropped();
                            warn!(message_id = %message.id(), "sqs_message_dropped_on_shutdown");
                            break 'poll;
                        }
                    },
                };
                permit.send(message);
            }
        }

        info!("poller_stopped");
    }

    /// Delete the message; failures are logged and the message is still forwarded
    async fn acknowledge(&self, message: &QueueMessage) {
        let Some(receipt_handle) = message.receipt_handle.as_deref() else {
            warn!(message_id = %message.id(), "sqs_message_without_receipt_handle");
            return;
        };

        match self.queue.delete(receipt_handle).await {
            Ok(()) => {
                self.metrics.record_message_deleted();
                debug!(message_id = %message.id(), "sqs_message_deleted");
            }
            Err(e) => {
                self.metrics.record_delete_error();
                error!(message_id = %message.id(), error = %e, "sqs_delete_failed");
            }
        }
    }
}

/// Wait for room in the hand-off channel. `None` on shutdown or when the
/// driver side is gone.
async fn next_slot<'a>(
    message_tx: &'a mpsc::Sender<QueueMessage>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<mpsc::Permit<'a, QueueMessage>> {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
            permit = message_tx.reserve() => match permit {
                Ok(permit) => return Some(permit),
                Err(_) => {
                    info!("poller_channel_closed");
                    return None;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sqs::QueueError;
    use crate::services::fakes::{message, FakeQueue};
    use tokio::task::JoinHandle;

    struct Harness {
        queue: Arc<FakeQueue>,
        metrics: Arc<Metrics>,
        rx: mpsc::Receiver<QueueMessage>,
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    }

    fn spawn_poller(queue: Arc<FakeQueue>) -> Harness {
        let metrics = Arc::new(Metrics::new());
        let (tx, rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = QueuePoller::new(queue.clone(), metrics.clone());
        let handle = tokio::spawn(poller.run(tx, shutdown_rx));
        Harness { queue, metrics, rx, shutdown_tx, handle }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_in_order_after_delete() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![message("a")]);
        queue.push_messages(vec![message("b")]);
        let mut h = spawn_poller(queue);

        let first = h.rx.recv().await.unwrap();
        assert_eq!(first.id(), "a");
        assert!(h.queue.deleted().contains(&"handle-a".to_string()));

        let second = h.rx.recv().await.unwrap();
        assert_eq!(second.id(), "b");
        assert_eq!(h.queue.deleted(), vec!["handle-a", "handle-b"]);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_parameters() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![message("a")]);
        let mut h = spawn_poller(queue);

        h.rx.recv().await.unwrap();
        let calls = h.queue.receive_calls();
        assert_eq!(calls[0], (1, Duration::from_secs(15)));

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_does_not_stop_polling() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_error(QueueError::Receive("throttled".to_string()));
        queue.push_error(QueueError::Receive("connection reset".to_string()));
        queue.push_messages(vec![message("after-errors")]);
        let mut h = spawn_poller(queue);

        let msg = h.rx.recv().await.unwrap();
        assert_eq!(msg.id(), "after-errors");
        assert_eq!(h.metrics.report().receive_errors, 2);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_still_forwards() {
        let queue = Arc::new(FakeQueue::new());
        queue.fail_delete("handle-a");
        queue.push_messages(vec![message("a")]);
        let mut h = spawn_poller(queue);

        let msg = h.rx.recv().await.unwrap();
        assert_eq!(msg.id(), "a");
        assert!(h.queue.deleted().is_empty());

        let summary = h.metrics.report();
        assert_eq!(summary.delete_errors, 1);
        assert_eq!(summary.messages_received, 1);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_without_receipt_handle_is_forwarded() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![QueueMessage::new(Some("x".to_string()), None, None)]);
        let mut h = spawn_poller(queue);

        let msg = h.rx.recv().await.unwrap();
        assert_eq!(msg.id(), "x");
        assert!(h.queue.deleted().is_empty());
        assert_eq!(h.metrics.report().delete_errors, 0);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_long_poll() {
        let queue = Arc::new(FakeQueue::new());
        let h = spawn_poller(queue);

        tokio::time::sleep(Duration::from_secs(40)).await;
        h.shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_channel_closed() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![message("a")]);
        let h = spawn_poller(queue);
        drop(h.rx);

        tokio::time::timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
        // No slot, so nothing was received or deleted
        assert!(h.queue.receive_calls().is_empty());
        assert!(h.queue.deleted().is_empty());
        drop(h.shutdown_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_free_slot_before_polling() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![message("a")]);
        queue.push_messages(vec![message("b")]);
        queue.push_messages(vec![message("c")]);
        let mut h = spawn_poller(queue);

        // "a" sits in the slot; no further receive until it is taken
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.queue.receive_calls().len(), 1);
        assert_eq!(h.queue.deleted(), vec!["handle-a"]);

        assert_eq!(h.rx.recv().await.unwrap().id(), "a");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.queue.receive_calls().len(), 2);
        assert_eq!(h.queue.deleted(), vec!["handle-a", "handle-b"]);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_waiting_for_slot() {
        let queue = Arc::new(FakeQueue::new());
        queue.push_messages(vec![message("a")]);
        queue.push_messages(vec![message("b")]);
        let h = spawn_poller(queue);

        tokio::time::sleep(Duration::from_secs(5)).await;
        h.shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
        // "b" was never received, so it stays on the queue
        assert_eq!(h.queue.receive_calls().len(), 1);
        assert_eq!(h.queue.deleted(), vec!["handle-a"]);
        assert_eq!(h.metrics.messages_dropped(), 0);
        drop(h.rx);
    }
}
