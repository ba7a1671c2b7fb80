//! Test doubles for the daemon's collaborators

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use presenced::daemon::{CorrelationTable, StatusWatcher, WatcherSettings};
use presenced::data::{SharedStatus, Status};
use presenced::integrations::identity::IdentityProvider;
use presenced::integrations::probe::StatusProbe;
use presenced::integrations::transport::Transport;
use presenced::protocol::{Action, WebsocketMessage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Probe whose answers can be changed between ticks; `None` means the query fails
#[derive(Default)]
pub struct FakeProbe {
    locked: Mutex<Option<bool>>,
    meeting: Mutex<Option<bool>>,
}

impl FakeProbe {
    pub fn new(locked: Option<bool>, meeting: Option<bool>) -> Arc<Self> {
        Arc::new(Self {
            locked: Mutex::new(locked),
            meeting: Mutex::new(meeting),
        })
    }

    pub fn set(&self, locked: Option<bool>, meeting: Option<bool>) {
        *self.locked.lock().unwrap() = locked;
        *self.meeting.lock().unwrap() = meeting;
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn is_locked(&self) -> Result<bool> {
        (*self.locked.lock().unwrap()).ok_or_else(|| anyhow::anyhow!("lock probe unavailable"))
    }

    async fn is_in_meeting(&self) -> Result<bool> {
        (*self.meeting.lock().unwrap()).ok_or_else(|| anyhow::anyhow!("meeting probe unavailable"))
    }
}

/// Ids `id-1`, `id-2`, ... or a failure on every call
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicU32,
    fail: bool,
}

impl SequentialIds {
    pub fn failing() -> Self {
        Self {
            next: AtomicU32::new(0),
            fail: true,
        }
    }
}

impl IdentityProvider for SequentialIds {
    fn new_id(&self) -> Result<String> {
        if self.fail {
            anyhow::bail!("entropy source unavailable");
        }
        Ok(format!("id-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// What the fake server does with each request
#[derive(Debug, Clone)]
pub enum Reply {
    /// Acknowledge with this message
    Ack(String),
    /// Acknowledgement action with an arbitrary payload
    RawAck(Value),
    /// Reply with a different action
    Other(Action),
    /// Never answer
    Silent,
    /// Refuse to enqueue
    Fail,
}

/// Transport that records requests and answers them through the correlation table
pub struct LoopbackTransport {
    table: Arc<CorrelationTable<WebsocketMessage>>,
    reply: Mutex<Reply>,
    sent: Mutex<Vec<WebsocketMessage>>,
    /// Live correlation entries observed at each send
    live_at_send: Mutex<Vec<usize>>,
}

impl LoopbackTransport {
    pub fn new(table: Arc<CorrelationTable<WebsocketMessage>>, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            table,
            reply: Mutex::new(reply),
            sent: Mutex::new(Vec::new()),
            live_at_send: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn sent(&self) -> Vec<WebsocketMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn live_at_send(&self) -> Vec<usize> {
        self.live_at_send.lock().unwrap().clone()
    }

    /// Status carried by the n-th request
    pub fn sent_status(&self, n: usize) -> Status {
        let data = &self.sent.lock().unwrap()[n].data;
        Status::new(
            data["working"].as_bool().unwrap(),
            data["meeting"].as_bool().unwrap(),
        )
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: WebsocketMessage) -> Result<()> {
        let reply = self.reply.lock().unwrap().clone();
        if let Reply::Fail = reply {
            anyhow::bail!("connection closed");
        }

        self.live_at_send.lock().unwrap().push(self.table.len());
        self.sent.lock().unwrap().push(message.clone());

        let response = match reply {
            Reply::Ack(text) => Some(response(&message.id, Action::UpdateOfficeStatusResponse, json!({ "message": text }))),
            Reply::RawAck(data) => Some(response(&message.id, Action::UpdateOfficeStatusResponse, data)),
            Reply::Other(action) => Some(response(&message.id, action, Value::Null)),
            Reply::Silent | Reply::Fail => None,
        };

        if let Some(response) = response {
            assert!(self.table.resolve(&message.id, response));
        }
        Ok(())
    }
}

pub fn response(id: &str, action: Action, data: Value) -> WebsocketMessage {
    WebsocketMessage {
        id: id.to_string(),
        action,
        user_id: String::new(),
        message: String::new(),
        data,
    }
}

/// Everything a watcher test needs to inspect
pub struct Harness {
    pub status: Arc<SharedStatus>,
    pub table: Arc<CorrelationTable<WebsocketMessage>>,
    pub probe: Arc<FakeProbe>,
    pub transport: Arc<LoopbackTransport>,
}

impl Harness {
    pub fn new(initial: Status, probe: Arc<FakeProbe>, reply: Reply) -> Self {
        let table = Arc::new(CorrelationTable::new());
        Self {
            status: Arc::new(SharedStatus::new(initial)),
            transport: LoopbackTransport::new(Arc::clone(&table), reply),
            table,
            probe,
        }
    }

    pub fn settings(response_timeout: Option<Duration>) -> WatcherSettings {
        WatcherSettings {
            user_id: "alice".to_string(),
            interval: Duration::from_secs(3600),
            response_timeout,
        }
    }

    pub fn watcher(&self) -> StatusWatcher {
        self.watcher_with(Self::settings(None), Arc::new(SequentialIds::default()))
    }

    pub fn watcher_with(
        &self,
        settings: WatcherSettings,
        ids: Arc<dyn IdentityProvider>,
    ) -> StatusWatcher {
        StatusWatcher::new(
            settings,
            Arc::clone(&self.status),
            Arc::clone(&self.table),
            self.probe.clone(),
            ids,
            self.transport.clone(),
        )
    }

    /// Poll until the transport has seen `count` requests
    pub async fn wait_for_sent(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.transport.sent_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for outbound request");
    }
}
