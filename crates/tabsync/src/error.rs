//! Error types for the facade.

use thiserror::Error;

use tabsync_adapters::AdapterError;
use tabsync_core::{AccessorError, MessageError};
use tabsync_sync::SyncError;

/// Any error raised by a tabsync component.
#[derive(Debug, Error)]
pub enum TabsyncError {
    /// Malformed wire message.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Store read or write failed.
    #[error("accessor error: {0}")]
    Accessor(#[from] AccessorError),

    /// Channel error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Adapter error.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// The tracing subscriber could not be installed.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, TabsyncError>;
