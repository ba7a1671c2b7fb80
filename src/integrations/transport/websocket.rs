//! WebSocket connection to the presence server
//!
//! Owns the receiving end of the outbound queue, so messages queued while the
//! connection is down are sent once it comes back. Reconnects with
//! exponential backoff until shut down.

use super::Dispatcher;
use crate::daemon::watcher::RefreshTrigger;
use crate::protocol::WebsocketMessage;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Base delay between reconnection attempts (exponential backoff).
const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Why a connection ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// Server closed the socket
    Closed,
    /// Every sender of the outbound queue was dropped
    QueueClosed,
}

pub struct WebsocketTransport {
    url: String,
    outbound: mpsc::Receiver<WebsocketMessage>,
    dispatcher: Dispatcher,
    on_connect: Option<RefreshTrigger>,
}

impl WebsocketTransport {
    pub fn new(
        url: impl Into<String>,
        outbound: mpsc::Receiver<WebsocketMessage>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            url: url.into(),
            outbound,
            dispatcher,
            on_connect: None,
        }
    }

    /// Fire `trigger` after every successful (re)connect
    pub fn resync_with(mut self, trigger: RefreshTrigger) -> Self {
        self.on_connect = Some(trigger);
        self
    }

    /// Connection loop with reconnection logic
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempts = 0u32;

        loop {
            let result = tokio::select! {
                result = self.run_connection(&mut attempts) => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(ConnectionEnd::QueueClosed) => {
                    tracing::info!("Outbound queue closed, stopping transport");
                    break;
                }
                Ok(ConnectionEnd::Closed) => {
                    tracing::warn!("Server closed the connection");
                }
                Err(e) => {
                    tracing::warn!("Connection to {} failed: {:#}", self.url, e);
                }
            }

            attempts = attempts.saturating_add(1);
            let delay = Duration::from_secs(calculate_backoff_delay(attempts));
            tracing::info!("Reconnecting in {}s (attempt {})", delay.as_secs(), attempts);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Transport stopped");
    }

    /// Run a single WebSocket connection
    async fn run_connection(&mut self, attempts: &mut u32) -> Result<ConnectionEnd> {
        let Self {
            url,
            outbound,
            dispatcher,
            on_connect,
        } = self;

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        tracing::info!("Connected to {}", url);
        *attempts = 0;
        if let Some(trigger) = on_connect {
            trigger.fire();
        }

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    let Some(message) = queued else {
                        let _ = write.close().await;
                        return Ok(ConnectionEnd::QueueClosed);
                    };

                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Dropping outbound {}: {:#}", message.action, e);
                            continue;
                        }
                    };
                    tracing::debug!("Sending {} (id {})", message.action, message.id);
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .context("Failed to send frame")?;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatcher.dispatch_text(text.as_str());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .context("Failed to answer ping")?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                },
            }
        }
    }
}

/// Exponential backoff delay in seconds
fn calculate_backoff_delay(attempts: u32) -> u64 {
    std::cmp::min(
        RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
        MAX_RECONNECT_DELAY_SECS,
    )
}
