//! Presence daemon
//!
//! Wires the status watcher to the server connection and keeps both running
//! until the process is asked to stop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Daemon                                │
//! │  ┌───────────────┐  send   ┌──────────────┐   ┌────────────────┐  │
//! │  │ StatusWatcher │───────▶│ OutboundQueue │──▶│ Websocket loop │  │
//! │  └──────┬────────┘         └──────────────┘   └───────┬────────┘  │
//! │         │ register/remove                      resolve │           │
//! │         └──────────────▶ CorrelationTable ◀───────────┘           │
//! │                                                                    │
//! │  SIGUSR1 / reconnect ──▶ RefreshTrigger ──▶ StatusWatcher          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod correlation;
pub mod watcher;

pub use correlation::{CorrelationError, CorrelationTable};
pub use watcher::{ExchangeOutcome, RefreshTrigger, StatusWatcher, WatcherHandle, WatcherSettings};

use crate::config::Config;
use crate::data::SharedStatus;
use crate::integrations::identity::ShortUuid;
use crate::integrations::probe;
use crate::integrations::transport::{Dispatcher, OutboundQueue, WebsocketTransport};
use crate::protocol::WebsocketMessage;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Daemon {
    config: Config,
    status: Arc<SharedStatus>,
    table: Arc<CorrelationTable<WebsocketMessage>>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            status: Arc::new(SharedStatus::default()),
            table: Arc::new(CorrelationTable::new()),
        }
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let running = self.start().await;
        let result = wait_for_shutdown(running.trigger()).await;
        tracing::info!("Shutting down");
        running.stop().await?;
        result
    }

    /// Seed the status from a first probe, then spawn the watcher and the
    /// server connection
    pub async fn start(self) -> RunningDaemon {
        let (queue, outbound_rx) = OutboundQueue::new();

        let watcher = StatusWatcher::new(
            WatcherSettings::from_config(&self.config),
            Arc::clone(&self.status),
            Arc::clone(&self.table),
            probe::from_config(&self.config.probe),
            Arc::new(ShortUuid),
            Arc::new(queue),
        );
        watcher.prime().await;
        let watcher = watcher.spawn();

        let (transport_stop, transport_stop_rx) = watch::channel(false);
        let transport = WebsocketTransport::new(
            self.config.server.url.clone(),
            outbound_rx,
            Dispatcher::new(Arc::clone(&self.table)),
        )
        .resync_with(watcher.trigger());
        let transport = tokio::spawn(transport.run(transport_stop_rx));

        RunningDaemon {
            grace: self.config.watcher.shutdown_grace(),
            status: self.status,
            table: self.table,
            watcher,
            transport_stop,
            transport,
        }
    }
}

pub struct RunningDaemon {
    grace: Duration,
    status: Arc<SharedStatus>,
    table: Arc<CorrelationTable<WebsocketMessage>>,
    watcher: WatcherHandle,
    transport_stop: watch::Sender<bool>,
    transport: JoinHandle<()>,
}

impl RunningDaemon {
    /// Trigger used for SIGUSR1 forced refreshes
    pub fn trigger(&self) -> RefreshTrigger {
        self.watcher.trigger()
    }

    pub fn status(&self) -> &Arc<SharedStatus> {
        &self.status
    }

    pub fn table(&self) -> &Arc<CorrelationTable<WebsocketMessage>> {
        &self.table
    }

    /// Stop the watcher (within the grace period) and then the transport
    pub async fn stop(self) -> Result<StopOutcome> {
        let outcome = stop_watcher(self.watcher, self.grace, &self.table).await?;

        let _ = self.transport_stop.send(true);
        if let Err(e) = self.transport.await {
            tracing::warn!("Transport task failed: {}", e);
        }

        Ok(outcome)
    }
}

/// How the watcher ended when the daemon stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Still awaiting a response when the grace period ran out
    Abandoned { pending: usize },
}

/// Ask the watcher to stop and give it `grace` to finish its exchange.
///
/// An abandoned watcher task is detached; its table entries stay registered.
pub async fn stop_watcher<M>(
    handle: WatcherHandle,
    grace: Duration,
    table: &CorrelationTable<M>,
) -> Result<StopOutcome> {
    handle.shutdown();
    match tokio::time::timeout(grace, handle.join()).await {
        Ok(joined) => {
            joined?;
            Ok(StopOutcome::Stopped)
        }
        Err(_) => {
            let pending = table.len();
            tracing::warn!(
                "Status watcher still awaiting a response after {}s, abandoning {} pending exchange(s)",
                grace.as_secs(),
                pending
            );
            Ok(StopOutcome::Abandoned { pending })
        }
    }
}

/// Wait for a stop signal, forwarding SIGUSR1 as a forced refresh
async fn wait_for_shutdown(trigger: RefreshTrigger) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 =
            signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    return res.context("Failed to listen for Ctrl-C");
                }
                _ = term.recv() => return Ok(()),
                _ = usr1.recv() => {
                    tracing::info!("SIGUSR1 received, forcing status update");
                    trigger.fire();
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        drop(trigger);
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
    }
}
