//! # Tabsync Adapters
//!
//! Bindings between concrete store shapes and a [`ChannelManager`].
//!
//! Each adapter supplies a [`StateAccessor`] for its store kind, subscribes
//! to the store's change notifications and forwards local changes to the
//! channel. Changes applied from other peers are not re-broadcast: the
//! manager suppresses any broadcast made while it is applying received
//! state.
//!
//! ## Store kinds
//!
//! - [`SlicedAdapter`] - independent per-key stores ([`SliceStore`])
//! - [`ReducerAdapter`] - one root store driven by actions ([`ReducerStore`])
//! - [`ObservableAdapter`] - one object with tracked fields ([`ObservableStore`])
//!
//! [`ChannelManager`]: tabsync_sync::ChannelManager
//! [`StateAccessor`]: tabsync_core::StateAccessor

pub mod binding;
pub mod error;
pub mod observable;
pub mod reducer;
pub mod sliced;
pub mod subscription;

pub use binding::{AdapterOptions, Binding};
pub use error::{AdapterError, Result};
pub use observable::{ObservableAccessor, ObservableAdapter, ObservableStore, OBSERVABLE_CHANNEL};
pub use reducer::{
    Action, MemoryReducerStore, ReducerAccessor, ReducerAdapter, ReducerStore, SliceReducer,
    REDUCER_CHANNEL,
};
pub use sliced::{MemorySlice, SliceStore, SlicedAccessor, SlicedAdapter, WriteMode, SLICE_CHANNEL};
pub use subscription::{Listeners, Subscription};
