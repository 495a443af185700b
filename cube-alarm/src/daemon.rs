//! Process wiring.
//!
//! [`Daemon::build`] creates every component from a [`Config`] and connects
//! their channels; [`Daemon::run`] spawns the actors and serves the API
//! until the shutdown token is cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::api::commands::CubeCommand;
use crate::api::{self, ApiState};
use crate::audio::{AudioPlayer, CommandPlayer, NullPlayer};
use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::cube::CubeLink;
use crate::cube::LinkError;
use crate::cube::transport::{CubeTransport, SerialBridge};
use crate::error::Result;
use crate::machine::{AlarmStateMachine, MachineInput};
use crate::scheduler::{LocalClock, Scheduler};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

const MACHINE_CAPACITY: usize = 64;
const CUBE_COMMAND_CAPACITY: usize = 16;

/// Every component of a running daemon, wired but not yet started.
pub struct Daemon {
    config: Config,
    store: Arc<AlarmStore>,
    broadcaster: Arc<EventBroadcaster>,
    machine: AlarmStateMachine,
    link: CubeLink,
    scheduler: Scheduler,
    machine_tx: mpsc::Sender<MachineInput>,
    cube_cmd_tx: mpsc::Sender<CubeCommand>,
}

impl Daemon {
    /// Load the alarm store and construct the actors.
    ///
    /// A missing store file yields an empty store; an unreadable or corrupt
    /// one is an error.
    pub fn build(config: Config) -> Result<Self> {
        let store = Arc::new(AlarmStore::open(&config.store_path)?);
        info!(
            path = %config.store_path.display(),
            alarms = store.len(),
            "Alarm store loaded"
        );

        let broadcaster = Arc::new(EventBroadcaster::new());
        let (machine_tx, machine_rx) = mpsc::channel(MACHINE_CAPACITY);
        let (cube_cmd_tx, cube_cmd_rx) = mpsc::channel(CUBE_COMMAND_CAPACITY);

        let player: Arc<dyn AudioPlayer> = match &config.sound {
            Some(_) => Arc::new(CommandPlayer::new(config.player.clone())),
            None => {
                info!("Alarm sound suppressed");
                Arc::new(NullPlayer)
            }
        };
        let machine = AlarmStateMachine::new(
            config.sound.clone(),
            player,
            broadcaster.clone(),
            machine_rx,
        );

        let transport: Option<Arc<dyn CubeTransport>> = match &config.bridge_port {
            Some(port) => {
                info!(port = %port, "Using serial radio bridge");
                Some(Arc::new(SerialBridge::new(port.clone())))
            }
            None => {
                warn!("No radio bridge configured, cube link disabled");
                None
            }
        };
        let link = CubeLink::new(
            transport,
            config.cube_address.clone(),
            cube_cmd_rx,
            broadcaster.clone(),
            machine_tx.clone(),
        );

        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(LocalClock),
            machine_tx.clone(),
            config.tick,
        );

        Ok(Self {
            config,
            store,
            broadcaster,
            machine,
            link,
            scheduler,
            machine_tx,
            cube_cmd_tx,
        })
    }

    pub fn api_addr(&self) -> SocketAddr {
        self.config.api_addr
    }

    /// Run until `shutdown` is cancelled or the API server fails.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let tasks = TaskTracker::new();
        tasks.spawn(self.machine.run(shutdown.clone()));
        tasks.spawn(self.link.run(shutdown.clone()));
        tasks.spawn(self.scheduler.run(shutdown.clone()));
        if self.config.auto_connect {
            tasks.spawn(auto_connect(self.cube_cmd_tx.clone()));
        }
        tasks.close();

        let state = Arc::new(ApiState {
            store: self.store,
            broadcaster: self.broadcaster,
            machine_tx: self.machine_tx,
            cube_cmd_tx: self.cube_cmd_tx,
            shutdown: shutdown.clone(),
            started: Instant::now(),
        });
        let served = api::serve(listener, state, shutdown.clone()).await;

        // A failed server takes the actors down with it.
        shutdown.cancel();
        tasks.wait().await;
        info!("Daemon stopped");
        served
    }
}

/// Bind the API listener. Failure here is fatal.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Build, bind and run a daemon from `config`.
pub async fn run(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let daemon = Daemon::build(config).context("failed to initialize daemon")?;
    let addr = daemon.api_addr();
    let listener = bind(addr)
        .await
        .with_context(|| format!("failed to bind API listener on {addr}"))?;
    daemon.run(listener, shutdown).await
}

async fn auto_connect(cube_cmd_tx: mpsc::Sender<CubeCommand>) {
    let (reply, rx) = oneshot::channel();
    if cube_cmd_tx.send(CubeCommand::Connect { reply }).await.is_err() {
        return;
    }
    match rx.await {
        Ok(Ok(())) => debug!("Cube auto-connect started"),
        Ok(Err(LinkError::NoTransport)) => debug!("Cube auto-connect skipped, no transport"),
        Ok(Err(e)) => warn!(error = %e, "Cube auto-connect failed"),
        Err(_) => {}
    }
}
