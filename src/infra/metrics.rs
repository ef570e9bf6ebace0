//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated by the poller and driver tasks.
//! All atomics use Relaxed ordering: these are statistical counters only
//! and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    messages_received: AtomicU64,
    messages_deleted: AtomicU64,
    delete_errors: AtomicU64,
    receive_errors: AtomicU64,
    /// Deleted from the queue but discarded by shutdown before a cycle ran
    messages_dropped: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    /// Sum of ON time over completed cycles (ms)
    on_time_ms: AtomicU64,
    /// Max receive-to-actuation delay since last report (ms), reset on report
    handoff_delay_max_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_deleted(&self) {
        self.messages_deleted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delete_error(&self) {
        self.delete_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed cycle and how long the switch stayed on
    #[inline]
    pub fn record_cycle_completed(&self, on_duration: Duration) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.on_time_ms.fetch_add(on_duration.as_millis() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time between receiving a message and starting its cycle
    #[inline]
    pub fn record_handoff_delay(&self, delay: Duration) {
        update_atomic_max(&self.handoff_delay_max_ms, delay.as_millis() as u64);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    /// Snapshot counters; the handoff delay max is reset for the next window
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_deleted: self.messages_deleted.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            on_time_ms: self.on_time_ms.load(Ordering::Relaxed),
            handoff_delay_max_ms: self.handoff_delay_max_ms.swap(0, Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub messages_received: u64,
    pub messages_deleted: u64,
    pub delete_errors: u64,
    pub receive_errors: u64,
    pub messages_dropped: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub on_time_ms: u64,
    pub handoff_delay_max_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            messages_received = %self.messages_received,
            messages_deleted = %self.messages_deleted,
            delete_errors = %self.delete_errors,
            receive_errors = %self.receive_errors,
            messages_dropped = %self.messages_dropped,
            cycles_completed = %self.cycles_completed,
            cycles_failed = %self.cycles_failed,
            on_time_ms = %self.on_time_ms,
            handoff_delay_max_ms = %self.handoff_delay_max_ms,
            "metrics"
        );
    }
}
