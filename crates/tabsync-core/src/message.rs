//! Wire message exchanged between peers on a channel.
//!
//! This is the only format that travels over a transport. The state payload is
//! carried as a JSON value so transports stay independent of the application's
//! state type.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::types::{InstanceId, SyncId};

/// Discriminator for the five protocol messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Ask every peer for its full snapshot.
    #[serde(rename = "STATE_REQUEST")]
    Request,
    /// Full snapshot answering a request with the same id.
    #[serde(rename = "STATE_RESPONSE")]
    Response,
    /// Partial state changed locally by the sender.
    #[serde(rename = "STATE_UPDATE")]
    Update,
    /// Sender began initial-state acquisition.
    #[serde(rename = "STATE_SYNC_START")]
    SyncStart,
    /// Sender finished initial-state acquisition.
    #[serde(rename = "STATE_SYNC_END")]
    SyncEnd,
}

/// A protocol message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SyncId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    /// Sender's wall clock in Unix milliseconds. Informational only; zero
    /// when the sender omitted it.
    #[serde(default)]
    pub timestamp: i64,
    pub source: InstanceId,
}

impl WireMessage {
    fn new(
        kind: MessageType,
        source: InstanceId,
        id: Option<SyncId>,
        state: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            id,
            state,
            timestamp: now_millis(),
            source,
        }
    }

    pub fn request(source: InstanceId, id: SyncId) -> Self {
        Self::new(MessageType::Request, source, Some(id), None)
    }

    pub fn response(source: InstanceId, id: SyncId, state: serde_json::Value) -> Self {
        Self::new(MessageType::Response, source, Some(id), Some(state))
    }

    pub fn update(source: InstanceId, state: serde_json::Value) -> Self {
        Self::new(MessageType::Update, source, None, Some(state))
    }

    pub fn sync_start(source: InstanceId, id: SyncId) -> Self {
        Self::new(MessageType::SyncStart, source, Some(id), None)
    }

    pub fn sync_end(source: InstanceId, id: SyncId) -> Self {
        Self::new(MessageType::SyncEnd, source, Some(id), None)
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check that the message carries every field its type requires.
    pub fn validate(&self) -> Result<(), MessageError> {
        let needs_id = !matches!(self.kind, MessageType::Update);
        let needs_state = matches!(self.kind, MessageType::Response | MessageType::Update);

        if needs_id && self.id.is_none() {
            return Err(MessageError::MissingId(self.kind));
        }
        if needs_state && self.state.is_none() {
            return Err(MessageError::MissingState(self.kind));
        }
        Ok(())
    }

    /// Whether this message was sent by `instance`.
    pub fn is_from(&self, instance: &InstanceId) -> bool {
        &self.source == instance
    }
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
