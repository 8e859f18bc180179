//! Error types for the sync module.

use thiserror::Error;

use tabsync_core::{AccessorError, MessageError, SyncId};

/// Errors that can occur while running a channel.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration rejected at construction.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The channel or transport has been closed.
    #[error("channel closed")]
    Closed,

    /// A state request went unanswered.
    #[error("timeout waiting for response to {0:?}")]
    Timeout(SyncId),

    /// A wire message is missing required fields.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    /// State could not be encoded to or decoded from the wire.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The store's snapshot or patch failed.
    #[error("accessor error: {0}")]
    Accessor(#[from] AccessorError),

    /// Construction happened outside a tokio runtime.
    #[error("no async runtime available")]
    NoRuntime,

    /// A pending request was cancelled by teardown.
    #[error("sync cancelled")]
    Cancelled,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
