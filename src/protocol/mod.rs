//! Wire messages exchanged with the presence server
//!
//! Every frame on the connection is a JSON encoded [`WebsocketMessage`]. The
//! `data` field carries an action specific payload, itself JSON.
//!
//! ```text
//! { "id": "1f0c9a2b",
//!   "action": "update-office-status-request",
//!   "user_id": "alice",
//!   "message": "office status has changed",
//!   "data": { "type": "standard", "working": true, "meeting": false } }
//! ```

use crate::data::Status;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Note attached to every outbound status request
pub const STATUS_CHANGED_NOTE: &str = "office status has changed";

/// Message actions understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    UpdateOfficeStatusRequest,
    UpdateOfficeStatusResponse,
    /// Anything else the server sends; routed nowhere
    #[serde(other)]
    Unknown,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateOfficeStatusRequest => "update-office-status-request",
            Self::UpdateOfficeStatusResponse => "update-office-status-response",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for every frame on the duplex connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketMessage {
    /// Correlation id of the exchange this frame belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub action: Action,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl WebsocketMessage {
    /// Build the outbound request announcing `status` for exchange `id`
    pub fn status_request(id: &str, user_id: &str, status: Status) -> Result<Self> {
        let data = serde_json::to_value(OfficeStatusRequest::standard(status))
            .context("Failed to encode office status request")?;

        Ok(Self {
            id: id.to_string(),
            action: Action::UpdateOfficeStatusRequest,
            user_id: user_id.to_string(),
            message: STATUS_CHANGED_NOTE.to_string(),
            data,
        })
    }

    /// Decode the `data` payload
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .with_context(|| format!("Failed to decode {} payload", self.action))
    }

    /// Parse a text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse websocket message")
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode websocket message")
    }
}

/// Kind of status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OfficeStatusType {
    #[default]
    Standard,
}

/// Payload of `update-office-status-request`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeStatusRequest {
    #[serde(rename = "type")]
    pub kind: OfficeStatusType,
    pub working: bool,
    pub meeting: bool,
}

impl OfficeStatusRequest {
    pub fn standard(status: Status) -> Self {
        Self {
            kind: OfficeStatusType::Standard,
            working: status.working,
            meeting: status.meeting,
        }
    }

    pub fn status(&self) -> Status {
        Status::new(self.working, self.meeting)
    }
}

/// Payload of `update-office-status-response`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeStatusResponse {
    pub message: String,
}
