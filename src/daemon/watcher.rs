//! Office status watcher
//!
//! Polls the local probe on a fixed interval and pushes the status to the
//! server whenever it changed, or unconditionally when a refresh is forced.
//! Each push is one exchange:
//!
//! ```text
//! new id ─▶ register slot ─▶ send request ─▶ await slot ─▶ decode ack ─▶ remove entry
//! ```
//!
//! Exchanges run one at a time inside the watcher task, so at most one
//! correlation entry per watcher is live. Shutdown is observed between
//! events only; an exchange still waiting for its answer is left behind.

use crate::config::Config;
use crate::daemon::correlation::{CorrelationTable, ResponseSlot};
use crate::data::{SharedStatus, Status};
use crate::integrations::identity::IdentityProvider;
use crate::integrations::probe::StatusProbe;
use crate::integrations::transport::Transport;
use crate::protocol::{Action, OfficeStatusResponse, WebsocketMessage};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How a tick or forced refresh ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Probe results matched the stored status, nothing sent
    Unchanged,
    /// Server acknowledged with this message
    Acknowledged(String),
    /// Acknowledgement arrived but its payload did not decode
    Malformed,
    /// Reply carried an action other than the acknowledgement
    Unexpected(Action),
    /// The exchange never got off the ground
    Skipped(String),
    /// No reply within the configured response timeout
    TimedOut,
    /// The slot was discarded before a reply was delivered
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub user_id: String,
    pub interval: Duration,
    /// `None` waits for the reply indefinitely
    pub response_timeout: Option<Duration>,
}

impl WatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_id: config.server.user_id.clone(),
            interval: config.watcher.interval(),
            response_timeout: config.watcher.response_timeout(),
        }
    }
}

/// Clonable handle that forces the watcher to push its current status
///
/// Triggers coalesce: firing while a refresh is already queued is a no-op.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

impl RefreshTrigger {
    /// Queue a forced refresh; false if one was already queued or the watcher is gone
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                tracing::debug!("Forced status update already queued");
                false
            }
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Status watcher stopped, ignoring forced update");
                false
            }
        }
    }
}

pub struct StatusWatcher {
    settings: WatcherSettings,
    status: Arc<SharedStatus>,
    table: Arc<CorrelationTable<WebsocketMessage>>,
    probe: Arc<dyn StatusProbe>,
    ids: Arc<dyn IdentityProvider>,
    transport: Arc<dyn Transport>,
}

impl StatusWatcher {
    pub fn new(
        settings: WatcherSettings,
        status: Arc<SharedStatus>,
        table: Arc<CorrelationTable<WebsocketMessage>>,
        probe: Arc<dyn StatusProbe>,
        ids: Arc<dyn IdentityProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            settings,
            status,
            table,
            probe,
            ids,
            transport,
        }
    }

    /// Query both facts, falling back independently on failure
    ///
    /// A failed lock query counts as locked (not working); a failed meeting
    /// query counts as not in a meeting.
    pub async fn sample(&self) -> Status {
        let working = match self.probe.is_locked().await {
            Ok(locked) => !locked,
            Err(e) => {
                tracing::warn!("Screen lock probe failed, assuming locked: {:#}", e);
                false
            }
        };

        let meeting = match self.probe.is_in_meeting().await {
            Ok(meeting) => meeting,
            Err(e) => {
                tracing::warn!("Meeting probe failed, assuming no meeting: {:#}", e);
                false
            }
        };

        Status::new(working, meeting)
    }

    /// Seed the shared status from the probe without talking to the server
    pub async fn prime(&self) -> Status {
        let current = self.sample().await;
        self.status.compare_and_set(current.working, current.meeting);
        tracing::info!("Initial status: {}", current);
        current
    }

    /// One timer tick: probe, diff, push if changed
    pub async fn tick(&self) -> ExchangeOutcome {
        tracing::debug!("Monitoring office status");

        let current = self.sample().await;
        let updated = self
            .status
            .compare_and_set(current.working, current.meeting);

        tracing::info!("Current status: {}", current);

        if !updated {
            tracing::debug!("Office status has no updates");
            return ExchangeOutcome::Unchanged;
        }

        self.exchange().await
    }

    /// Push the current status regardless of whether it changed
    pub async fn force_refresh(&self) -> ExchangeOutcome {
        tracing::info!("Received forced status update");
        self.exchange().await
    }

    async fn exchange(&self) -> ExchangeOutcome {
        let id = match self.ids.new_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Failed to create correlation id: {:#}", e);
                return ExchangeOutcome::Skipped(format!("no correlation id: {e}"));
            }
        };

        let slot = match self.table.register(&id) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::error!("{}", e);
                return ExchangeOutcome::Skipped(e.to_string());
            }
        };

        if let Err(e) = self.send_request(&id).await {
            self.table.remove(&id);
            tracing::warn!("Failed to send status update: {:#}", e);
            return ExchangeOutcome::Skipped(format!("send failed: {e}"));
        }

        let outcome = self.await_response(&id, slot).await;
        self.table.remove(&id);

        match &outcome {
            ExchangeOutcome::Acknowledged(message) => {
                tracing::info!("Status update {} acknowledged: {}", id, message)
            }
            ExchangeOutcome::Unexpected(action) => {
                tracing::debug!("Status update {} answered with {}, ignoring", id, action)
            }
            ExchangeOutcome::TimedOut => {
                tracing::warn!("Status update {} got no response in time", id)
            }
            ExchangeOutcome::Abandoned => {
                tracing::warn!("Status update {} was abandoned before a response", id)
            }
            ExchangeOutcome::Malformed
            | ExchangeOutcome::Skipped(_)
            | ExchangeOutcome::Unchanged => {}
        }

        outcome
    }

    async fn send_request(&self, id: &str) -> Result<()> {
        let status = self.status.read();
        let request = WebsocketMessage::status_request(id, &self.settings.user_id, status)?;

        tracing::debug!("Sending status update {} ({})", id, status);
        self.transport
            .send(request)
            .await
            .context("Failed to enqueue status request")
    }

    async fn await_response(
        &self,
        id: &str,
        slot: ResponseSlot<WebsocketMessage>,
    ) -> ExchangeOutcome {
        let received = match self.settings.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, slot).await {
                Ok(received) => received,
                Err(_) => return ExchangeOutcome::TimedOut,
            },
            None => slot.await,
        };

        let Ok(response) = received else {
            return ExchangeOutcome::Abandoned;
        };

        match response.action {
            Action::UpdateOfficeStatusResponse => {
                match response.decode_data::<OfficeStatusResponse>() {
                    Ok(data) => ExchangeOutcome::Acknowledged(data.message),
                    Err(e) => {
                        tracing::warn!(
                            "Failed to parse office status response {}, server side error? {:#}",
                            id,
                            e
                        );
                        ExchangeOutcome::Malformed
                    }
                }
            }
            other => ExchangeOutcome::Unexpected(other),
        }
    }

    /// Start the watcher loop on its own task
    pub fn spawn(self) -> WatcherHandle {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(refresh_rx, shutdown_rx));

        WatcherHandle {
            trigger: RefreshTrigger { tx: refresh_tx },
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut refresh: mpsc::Receiver<()>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick one interval from now, not immediately
        ticker.reset();

        tracing::info!(
            "Status watcher started (interval {}s)",
            self.settings.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(()) = refresh.recv() => {
                    self.force_refresh().await;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Status watcher stopped");
    }
}

/// Lifecycle handle for a spawned [`StatusWatcher`]
pub struct WatcherHandle {
    trigger: RefreshTrigger,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Force a status push; see [`RefreshTrigger::fire`]
    pub fn force_refresh(&self) -> bool {
        self.trigger.fire()
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    /// Ask the loop to stop before its next event
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit
    ///
    /// Does not return while an exchange is still waiting for its response.
    pub async fn join(self) -> Result<()> {
        self.task.await.context("Status watcher task failed")
    }
}
