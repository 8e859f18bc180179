//! Error types for tabsync core.

use thiserror::Error;

use crate::message::MessageType;

/// A wire message that does not carry the fields its type requires.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("{0:?} message is missing its correlation id")]
    MissingId(MessageType),

    #[error("{0:?} message is missing its state payload")]
    MissingState(MessageType),
}

/// Errors raised by a store's snapshot or patch functions.
#[derive(Debug, Error)]
pub enum AccessorError {
    /// The store could not produce or accept a value.
    #[error("store error: {0}")]
    Store(String),

    /// A state value could not be converted to or from JSON.
    #[error("state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The store behind the accessor has gone away.
    #[error("store unavailable")]
    Unavailable,
}

impl AccessorError {
    /// Shorthand for a store-specific failure.
    pub fn store(msg: impl Into<String>) -> Self {
        AccessorError::Store(msg.into())
    }
}
