//! Mock Hue bridge
//!
//! Serves `GET /api/<user>/lights/<id>` and `PUT /api/<user>/lights/<id>/state`
//! for local runs of mill-bridge without real hardware. State changes are
//! logged as they arrive.
//!
//! Usage:
//!   cargo run --bin mock_bridge -- --port 8080 --user dev --light 12
//!   HUE_BRIDGE_HOST=127.0.0.1:8080 HUE_BRIDGE_USER=dev cargo run --bin mill-bridge

use clap::Parser;
use mill_bridge::io::{MockBridge, MockLight};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock_bridge")]
#[command(about = "Mock Hue bridge for local simulation")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Bridge user accepted by the mock
    #[arg(short, long, default_value = "dev")]
    user: String,

    /// Light indices to expose (repeatable)
    #[arg(short, long = "light", default_values_t = vec![12])]
    lights: Vec<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let lights = args.lights.iter().map(|&index| (index, MockLight::new(&format!("Mock plug {}", index))));
    let bridge = MockBridge::start(
        SocketAddr::from(([0, 0, 0, 0], args.port)),
        &args.user,
        lights,
        shutdown_rx,
    )
    .await?;

    info!(addr = %bridge.addr(), user = %args.user, lights = ?args.lights, "mock_bridge_ready");

    tokio::signal::ctrl_c().await.ok();
    let _ = shutdown_tx.send(true);
    info!(state_changes = %bridge.state_changes().len(), "mock_bridge_stopped");
    Ok(())
}
