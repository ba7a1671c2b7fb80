//! Duplex message transport
//!
//! The watcher only needs two things from the connection:
//! - an outbound enqueue ([`Transport::send`])
//! - an inbound path that routes each frame back to whoever awaits it ([`Dispatcher`])
//!
//! # Architecture
//!
//! ```text
//!  StatusWatcher ──send──▶ OutboundQueue ──mpsc──▶ WebsocketTransport ──▶ server
//!       ▲                                                 │
//!       │ oneshot                                         │ text frame
//!       │                                                 ▼
//!  CorrelationTable ◀──────────resolve(id)────────── Dispatcher
//! ```

pub mod websocket;

use crate::daemon::correlation::CorrelationTable;
use crate::protocol::WebsocketMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use websocket::WebsocketTransport;

/// Capacity of the outbound queue between the watcher and the connection task
pub const OUTBOUND_CAPACITY: usize = 32;

/// Outbound side of the duplex channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enqueue `message` for delivery; does not wait for the server
    async fn send(&self, message: WebsocketMessage) -> Result<()>;
}

/// [`Transport`] that hands messages to the connection task over a channel
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<WebsocketMessage>,
}

impl OutboundQueue {
    /// Create the queue and the receiver the connection task drains
    pub fn new() -> (Self, mpsc::Receiver<WebsocketMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for OutboundQueue {
    async fn send(&self, message: WebsocketMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("Connection task is gone, outbound queue closed"))
    }
}

/// Inbound demultiplexer
///
/// Knows nothing about which exchange sent a request beyond the id carried in
/// the reply.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Arc<CorrelationTable<WebsocketMessage>>,
}

impl Dispatcher {
    pub fn new(table: Arc<CorrelationTable<WebsocketMessage>>) -> Self {
        Self { table }
    }

    /// Route `message` to its pending exchange; false if nobody awaits it
    pub fn dispatch(&self, message: WebsocketMessage) -> bool {
        if message.id.is_empty() {
            tracing::debug!("Dropping {} without correlation id", message.action);
            return false;
        }

        let id = message.id.clone();
        let action = message.action;
        let delivered = self.table.resolve(&id, message);
        if !delivered {
            tracing::debug!("No pending exchange for {} (id {})", action, id);
        }
        delivered
    }

    /// Parse a text frame and route it
    pub fn dispatch_text(&self, text: &str) -> bool {
        match WebsocketMessage::from_json(text) {
            Ok(message) => self.dispatch(message),
            Err(e) => {
                tracing::warn!("Ignoring malformed frame: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Action;

    fn response(id: &str) -> WebsocketMessage {
        WebsocketMessage {
            id: id.to_string(),
            action: Action::UpdateOfficeStatusResponse,
            user_id: String::new(),
            message: String::new(),
            data: serde_json::json!({ "message": "ok" }),
        }
    }

    #[tokio::test]
    async fn test_outbound_queue_delivers() {
        let (queue, mut rx) = OutboundQueue::new();
        queue.send(response("a")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_outbound_queue_closed() {
        let (queue, rx) = OutboundQueue::new();
        drop(rx);
        assert!(queue.send(response("a")).await.is_err());
    }

    #[test]
    fn test_dispatch_routes_by_id() {
        let table = Arc::new(CorrelationTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&table));
        let mut slot = table.register("a").unwrap();

        assert!(dispatcher.dispatch(response("a")));
        assert_eq!(slot.try_recv().unwrap().id, "a");
    }

    #[test]
    fn test_dispatch_without_id_dropped() {
        let table = Arc::new(CorrelationTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&table));
        let _slot = table.register("a").unwrap();

        assert!(!dispatcher.dispatch(response("")));
        assert!(table.contains("a"));
    }

    #[test]
    fn test_dispatch_text_malformed() {
        let dispatcher = Dispatcher::new(Arc::new(CorrelationTable::new()));
        assert!(!dispatcher.dispatch_text("not json"));
    }

    #[test]
    fn test_dispatch_text_routes() {
        let table = Arc::new(CorrelationTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&table));
        let mut slot = table.register("x1").unwrap();

        assert!(dispatcher.dispatch_text(
            r#"{"id":"x1","action":"update-office-status-response","data":{"message":"ok"}}"#
        ));
        assert_eq!(
            slot.try_recv().unwrap().action,
            Action::UpdateOfficeStatusResponse
        );
    }
}
