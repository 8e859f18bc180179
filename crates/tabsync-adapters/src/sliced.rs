//! Binding for stores split into independent slices, one store per key.
//!
//! Each slice is read and written whole. A change to any slice goes out as a
//! single-key patch `{key: slice_state}`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use tabsync_core::{AccessorError, StateAccessor, StateMap};
use tabsync_sync::{ChannelManager, Connector, SyncOutcome};

use crate::binding::{broadcast_from_listener, AdapterOptions, Binding};
use crate::error::{AdapterError, Result};
use crate::subscription::{Listeners, Subscription};

/// Channel used when the options name none.
pub const SLICE_CHANNEL: &str = "slice-channel";

/// One independently subscribable slice of state.
pub trait SliceStore: Send + Sync + 'static {
    fn get_state(&self) -> std::result::Result<Value, AccessorError>;

    /// Write a new slice state. Implementations notify their subscribers
    /// synchronously when the state changes.
    fn set_state(&self, value: Value) -> std::result::Result<(), AccessorError>;

    fn subscribe(&self, listener: Box<dyn Fn(&Value) + Send + Sync>) -> Subscription;
}

/// How [`MemorySlice::set`] combines a written value with the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// The written value replaces the slice.
    Replace,
    /// Top-level object fields are merged; anything else replaces.
    #[default]
    ShallowMerge,
    /// Objects are merged recursively; anything else replaces.
    DeepMerge,
}

/// In-memory slice store.
pub struct MemorySlice {
    state: Mutex<Value>,
    mode: WriteMode,
    listeners: Listeners<Value>,
}

impl MemorySlice {
    pub fn new(initial: Value) -> Self {
        Self::with_mode(initial, WriteMode::default())
    }

    pub fn with_mode(initial: Value, mode: WriteMode) -> Self {
        Self {
            state: Mutex::new(initial),
            mode,
            listeners: Listeners::new(),
        }
    }

    pub fn state(&self) -> Value {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Write `value` according to the slice's mode. Subscribers hear about it
    /// only if the state actually changed.
    pub fn set(&self, value: Value) {
        let next = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut next = state.clone();
            apply_write(&mut next, value, self.mode);
            if next == *state {
                return;
            }
            *state = next.clone();
            next
        };
        self.listeners.notify(&next);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl SliceStore for MemorySlice {
    fn get_state(&self) -> std::result::Result<Value, AccessorError> {
        Ok(self.state())
    }

    fn set_state(&self, value: Value) -> std::result::Result<(), AccessorError> {
        self.set(value);
        Ok(())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&Value) + Send + Sync>) -> Subscription {
        self.listeners.subscribe(move |value: &Value| listener(value))
    }
}

fn apply_write(target: &mut Value, value: Value, mode: WriteMode) {
    match mode {
        WriteMode::Replace => *target = value,
        WriteMode::ShallowMerge => match (target, value) {
            (Value::Object(current), Value::Object(fields)) => current.extend(fields),
            (slot, value) => *slot = value,
        },
        WriteMode::DeepMerge => deep_merge(target, value),
    }
}

fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(current), Value::Object(fields)) => {
            for (key, value) in fields {
                match current.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Reads and writes a map of named slices.
pub struct SlicedAccessor {
    slices: BTreeMap<String, Arc<dyn SliceStore>>,
}

impl SlicedAccessor {
    pub fn new(slices: BTreeMap<String, Arc<dyn SliceStore>>) -> Self {
        Self { slices }
    }
}

impl StateAccessor for SlicedAccessor {
    type State = StateMap;

    fn snapshot(&self) -> std::result::Result<StateMap, AccessorError> {
        let mut state = StateMap::new();
        for (key, slice) in &self.slices {
            state.insert(key.clone(), slice.get_state()?);
        }
        Ok(state)
    }

    fn patch(&self, partial: StateMap) -> std::result::Result<(), AccessorError> {
        for (key, value) in partial {
            match self.slices.get(&key) {
                Some(slice) => slice.set_state(value)?,
                None => tracing::trace!(%key, "patch names unknown slice, ignored"),
            }
        }
        Ok(())
    }
}

/// Keeps a set of slices in sync across peers.
pub struct SlicedAdapter {
    binding: Binding<SlicedAccessor>,
}

impl SlicedAdapter {
    /// Bind `slices` to a channel and start initial sync.
    ///
    /// Fails with [`AdapterError::EmptySlices`] when `slices` is empty.
    pub fn new<C: Connector>(
        slices: BTreeMap<String, Arc<dyn SliceStore>>,
        connector: &C,
        options: AdapterOptions,
    ) -> Result<Self> {
        if slices.is_empty() {
            return Err(AdapterError::EmptySlices);
        }

        let binding = Binding::new(
            SlicedAccessor::new(slices.clone()),
            connector,
            options.into_config(SLICE_CHANNEL),
        )?;

        for (key, slice) in slices {
            let broadcaster = binding.broadcaster();
            binding.hold(slice.subscribe(Box::new(move |state: &Value| {
                let partial = StateMap::single(key.clone(), state.clone());
                broadcast_from_listener(&broadcaster, &partial, &key);
            })));
        }

        Ok(Self { binding })
    }

    pub fn manager(&self) -> &ChannelManager<SlicedAccessor> {
        self.binding.manager()
    }

    pub async fn wait_synced(&self) -> Option<SyncOutcome> {
        self.binding.manager().wait_synced().await
    }

    pub fn broadcast_state(&self, partial: &StateMap) -> Result<()> {
        Ok(self.binding.broadcast_state(partial)?)
    }

    pub fn destroy(&self) {
        self.binding.destroy();
    }
}
