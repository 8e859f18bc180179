//! # Tabsync Core
//!
//! Pure primitives for tabsync: peer identities, the wire message, key-level
//! state maps and the accessor contract that concrete stores implement.
//!
//! This crate contains no I/O, no timers, no transport. It is shared
//! vocabulary for the channel manager and the store adapters.
//!
//! ## Key Types
//!
//! - [`InstanceId`] - Random identity of one running peer
//! - [`SyncId`] - Correlation id linking a request to its response
//! - [`WireMessage`] - The only format that travels between peers
//! - [`StateMap`] - Top-level keys to JSON values, merged by key-level replace
//! - [`StateAccessor`] - Snapshot/patch pair supplied by a concrete store

pub mod accessor;
pub mod error;
pub mod message;
pub mod state;
pub mod types;

pub use accessor::{FnAccessor, StateAccessor};
pub use error::{AccessorError, MessageError};
pub use message::{now_millis, MessageType, WireMessage};
pub use state::StateMap;
pub use types::{InstanceId, SyncId};
