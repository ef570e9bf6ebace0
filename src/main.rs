//! Mill bridge - runs the mill whenever a message lands on an SQS queue
//!
//! Long-polls the queue and, for every message, switches a Hue-controlled
//! relay on for the configured time before switching it off again.
//!
//! Module structure:
//! - `domain/` - Core types (QueueMessage, SwitchState, CycleReport)
//! - `io/` - External interfaces (SQS, Hue bridge, mock bridge)
//! - `services/` - Poller, mill actuator, driver loop
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use mill_bridge::infra::{Config, ConfigArgs, LogFormat, Metrics};
use mill_bridge::io::{HueBridge, SqsQueue};
use mill_bridge::services::{Driver, Mill, QueuePoller};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

fn init_logging(format: LogFormat) {
    // Default: INFO, use RUST_LOG=debug for bridge call timings
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ConfigArgs::parse();
    init_logging(args.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "mill_bridge_starting");

    let config = Config::load(&args)?;
    info!(
        config_file = %config.config_file(),
        sqs_queue_url = %config.sqs_queue_url(),
        hue_bridge_host = %config.hue_bridge_host(),
        hue_bridge_switch_number = %config.hue_bridge_switch_number(),
        mill_time_ms = %config.mill_time().as_millis(),
        hue_bridge_timeout_ms = %config.hue_bridge_timeout_ms(),
        metrics_interval_secs = %config.metrics_interval_secs(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let bridge = HueBridge::new(
        config.hue_bridge_host(),
        config.hue_bridge_user(),
        Duration::from_millis(config.hue_bridge_timeout_ms()),
    )?;
    let mill = Mill::new(bridge, config.hue_bridge_switch_number(), config.mill_time());
    let driver = Driver::new(mill, metrics.clone());

    // Single-slot hand-off: the poller reserves the slot before each long-poll,
    // so at most one deleted message waits behind a running cycle
    let (message_tx, message_rx) = mpsc::channel(1);

    let queue = SqsQueue::from_env(config.sqs_queue_url()).await;
    let poller = QueuePoller::new(queue, metrics.clone());
    let poller_handle = tokio::spawn(
        poller.run(message_tx, shutdown_rx.clone()).instrument(info_span!("poller")),
    );

    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let reporter = metrics.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter.report().log(),
                    _ = reporter_shutdown.changed() => return,
                }
            }
        });
    }

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run driver on the main task - one cycle at a time until shutdown
    driver.run(message_rx, shutdown_rx).instrument(info_span!("driver")).await;

    if let Err(e) = poller_handle.await {
        tracing::error!(error = %e, "poller_task_failed");
    }

    metrics.report().log();
    info!("mill_bridge shutdown complete");
    Ok(())
}
