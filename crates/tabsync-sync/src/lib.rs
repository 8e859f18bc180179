//! # Tabsync Sync
//!
//! Keeps a state object consistent across peers (tabs, windows, workers) that
//! share nothing but a best-effort broadcast channel.
//!
//! ## Overview
//!
//! Each peer runs one [`ChannelManager`]. Local changes go out as partial
//! UPDATEs; inbound messages are handled one at a time in arrival order. A
//! peer that starts late asks the others for a full snapshot and, if nobody
//! answers, keeps its own state.
//!
//! ## Key Properties
//!
//! - **No echoes**: a peer ignores messages carrying its own instance id
//! - **No amplification**: applying a peer's update never triggers a
//!   re-broadcast of that update
//! - **FIFO per peer**: inbound messages are applied in arrival order;
//!   last write by arrival wins per key
//! - **Degrades silently**: with no transport or no peers, each manager keeps
//!   working on its local state
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabsync_core::{FnAccessor, StateMap};
//! use tabsync_sync::{ChannelConfig, ChannelManager, MemoryNetwork};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let accessor = FnAccessor::new(
//!         || Ok(StateMap::new()),
//!         |_patch: StateMap| Ok(()),
//!     );
//!
//!     let manager = ChannelManager::new(accessor, &network, ChannelConfig::new("todos")).unwrap();
//!     let outcome = manager.wait_synced().await;
//!     println!("initial sync: {:?}", outcome);
//!
//!     manager
//!         .broadcast_state(&StateMap::single("filter", "active".into()))
//!         .unwrap();
//!     manager.destroy();
//! }
//! ```

pub mod config;
pub mod convergence;
pub mod error;
pub mod manager;
mod pending;
mod queue;
pub mod stats;
pub mod transport;

pub use config::{ChannelConfig, DEFAULT_CHANNEL_NAME};
pub use convergence::{state_digest, verify_convergence, ConvergenceResult, StateDigest};
pub use error::{Result, SyncError};
pub use manager::{Broadcaster, ChannelManager};
pub use stats::{ChannelStats, SyncOutcome};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Connector, Transport};
