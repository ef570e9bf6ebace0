//! Driver loop - runs one mill cycle per forwarded message
//!
//! Strictly sequential: while a cycle runs no message is taken off the
//! channel, so a burst of N messages turns into N back-to-back cycles.
//! Shutdown is only honored between cycles so the switch is never left on.
//! A message still waiting in the hand-off at that point is logged and dropped.

use crate::domain::types::{CycleReport, QueueMessage};
use crate::infra::metrics::Metrics;
use crate::io::hue::SwitchControl;
use crate::services::mill::{ActuationError, Mill};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Result of the cycle triggered by one message
#[derive(Debug)]
pub struct CycleOutcome {
    pub message_id: Option<String>,
    pub result: Result<CycleReport, ActuationError>,
}

pub struct Driver<S> {
    mill: Mill<S>,
    metrics: Arc<Metrics>,
    outcome_tx: Option<mpsc::Sender<CycleOutcome>>,
}

impl<S: SwitchControl> Driver<S> {
    pub fn new(mill: Mill<S>, metrics: Arc<Metrics>) -> Self {
        Self { mill, metrics, outcome_tx: None }
    }

    /// Publish every cycle outcome on this channel
    pub fn with_outcome_tx(mut self, tx: mpsc::Sender<CycleOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    /// Consume messages until the channel closes or shutdown is signalled.
    /// Returns the number of cycles run.
    pub async fn run(
        self,
        mut message_rx: mpsc::Receiver<QueueMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!(
            switch = %self.mill.index(),
            duration_ms = %self.mill.duration().as_millis(),
            "driver_started"
        );
        let mut cycles = 0;

        'idle: loop {
            if *shutdown.borrow() {
                self.discard_pending(&mut message_rx).await;
                break 'idle;
            }

            let message = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.discard_pending(&mut message_rx).await;
                        break 'idle;
                    }
                    continue 'idle;
                }
                message = message_rx.recv() => match message {
                    Some(message) => message,
                    None => {
                        info!("driver_channel_closed");
                        break 'idle;
                    }
                },
            };

            self.actuate(message).await;
            cycles += 1;
        }

        info!(cycles = %cycles, "driver_stopped");
        cycles
    }

    /// Close the hand-off and log every message that was deleted from the
    /// queue but will never be actuated. Waits for a hand-off already in
    /// progress on the poller side.
    async fn discard_pending(&self, message_rx: &mut mpsc::Receiver<QueueMessage>) {
        message_rx.close();
        while let Some(message) = message_rx.recv().await {
            self.metrics.record_message_dropped();
            warn!(message_id = %message.id(), "sqs_message_dropped_on_shutdown");
        }
    }

    async fn actuate(&self, message: QueueMessage) {
        let handoff_delay = message.received_at.elapsed();
        self.metrics.record_handoff_delay(handoff_delay);
        info!(
            message_id = %message.id(),
            body = ?message.body,
            handoff_delay_ms = %handoff_delay.as_millis(),
            "mill_requested"
        );

        let result = self.mill.run_cycle().await;
        match &result {
            Ok(report) => {
                self.metrics.record_cycle_completed(report.on_duration);
                info!(
                    message_id = %message.id(),
                    switch = %report.index,
                    on_ms = %report.on_duration.as_millis(),
                    "mill_cycle_complete"
                );
            }
            Err(e) => {
                self.metrics.record_cycle_failed();
                error!(message_id = %message.id(), error = %e, "mill_cycle_failed");
            }
        }

        if let Some(ref tx) = self.outcome_tx {
            let outcome = CycleOutcome { message_id: message.message_id, result };
            if let Err(TrySendError::Full(_)) = tx.try_send(outcome) {
                warn!("cycle_outcome_dropped: channel full");
            }
        }
    }
}
