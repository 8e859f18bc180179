//! # Tabsync
//!
//! Keeps one piece of application state consistent across every tab,
//! window or worker that shares a broadcast channel.
//!
//! ## Overview
//!
//! - **Partial updates**: a local change is broadcast as just the keys that
//!   changed; peers apply it by key-level replace
//! - **Initial sync**: a new peer asks the others for a full snapshot and
//!   keeps its own state if nobody answers
//! - **No echo, no amplification**: a peer ignores its own messages and
//!   never re-broadcasts state it is applying
//! - **Silent degradation**: without a working transport every peer simply
//!   runs on its local state
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tabsync::adapters::{AdapterOptions, MemorySlice, SliceStore, SlicedAdapter};
//! use tabsync::sync::MemoryNetwork;
//!
//! async fn example() {
//!     tabsync::logging::init_tracing("info").ok();
//!
//!     let network = MemoryNetwork::new();
//!     let todos = Arc::new(MemorySlice::new(json!({ "items": [] })));
//!
//!     let mut slices: BTreeMap<String, Arc<dyn SliceStore>> = BTreeMap::new();
//!     slices.insert("todos".into(), todos.clone());
//!
//!     let adapter = SlicedAdapter::new(slices, &network, AdapterOptions::new()).unwrap();
//!     adapter.wait_synced().await;
//!
//!     // Every other tab on "slice-channel" sees this.
//!     todos.set(json!({ "items": ["buy milk"] }));
//!     adapter.destroy();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tabsync::core` - Ids, wire message, `StateMap`, `StateAccessor`
//! - `tabsync::sync` - Channel manager, transports, convergence checks
//! - `tabsync::adapters` - Sliced, reducer and observable store bindings

pub mod error;
pub mod logging;

// Re-export component crates
pub use tabsync_adapters as adapters;
pub use tabsync_core as core;
pub use tabsync_sync as sync;

pub use error::{Result, TabsyncError};

// Re-export commonly used types
pub use tabsync_core::{FnAccessor, InstanceId, StateAccessor, StateMap, SyncId, WireMessage};
pub use tabsync_sync::{
    Broadcaster, ChannelConfig, ChannelManager, Connector, MemoryNetwork, SyncOutcome, Transport,
};
