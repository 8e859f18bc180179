//! Error types for store adapters.

use thiserror::Error;

use tabsync_core::AccessorError;
use tabsync_sync::SyncError;

/// Errors raised while binding a store to a channel.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A sliced or reducer adapter was given no slices.
    #[error("slices cannot be empty")]
    EmptySlices,

    /// An observable adapter was given no keys to track.
    #[error("state keys cannot be empty")]
    EmptyKeys,

    /// Reading the store while binding failed.
    #[error("store error: {0}")]
    Accessor(#[from] AccessorError),

    /// Opening or driving the channel failed.
    #[error("channel error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
