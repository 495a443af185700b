//! Cube alarm daemon.
//!
//! Runs the scheduler, cube link, alarm state machine and HTTP API until
//! SIGINT or SIGTERM.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use cube_alarm::config::Config;
use cube_alarm::daemon;
use cube_alarm::tracing::{init_journald_or_stdout, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    init_journald_or_stdout();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        api = %config.api_addr,
        store = %config.store_path.display(),
        bridge = config.bridge_port.as_deref().unwrap_or("none"),
        "Starting cube-alarmd"
    );

    let shutdown = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        });
    }

    if let Err(e) = daemon::run(config, shutdown).await {
        error!(error = %format!("{e:#}"), "Daemon failed");
        return Err(e);
    }
    Ok(())
}
