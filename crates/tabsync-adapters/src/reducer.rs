//! Binding for single-store, action-dispatch stores.
//!
//! The store holds one root object whose top-level keys are slices, each
//! owned by a reducer. Remote state is written back by dispatching the
//! slice's `setState` (or `replaceState`) action; local changes are found by
//! comparing the root state before and after each dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tabsync_core::{AccessorError, StateAccessor, StateMap};
use tabsync_sync::{ChannelManager, Connector, SyncOutcome};

use crate::binding::{broadcast_from_listener, AdapterOptions, Binding};
use crate::error::{AdapterError, Result};
use crate::subscription::{Listeners, Subscription};

/// Channel used when the options name none.
pub const REDUCER_CHANNEL: &str = "reducer-channel";

const SET_STATE_SUFFIX: &str = "/setState";
const REPLACE_STATE_SUFFIX: &str = "/replaceState";

/// A dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }
}

/// A store driven by actions.
pub trait ReducerStore: Send + Sync + 'static {
    /// The whole root state.
    fn state(&self) -> std::result::Result<StateMap, AccessorError>;

    fn dispatch(&self, action: Action) -> std::result::Result<(), AccessorError>;

    /// Action types handled by the reducer of `slice`.
    fn action_types(&self, slice: &str) -> Vec<String>;

    /// Called after every dispatch, changed or not.
    fn subscribe(&self, listener: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

/// Reducer for one case: `(slice_state, payload) -> new_slice_state`.
pub type CaseReducer = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// A named slice with its initial state and case reducers.
#[derive(Clone)]
pub struct SliceReducer {
    name: String,
    initial: Value,
    cases: BTreeMap<String, CaseReducer>,
}

impl SliceReducer {
    pub fn new(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            initial,
            cases: BTreeMap::new(),
        }
    }

    /// Handle action type `<name>/<case>` with `reducer`.
    pub fn on(
        mut self,
        case: &str,
        reducer: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        let action_type = format!("{}/{}", self.name, case);
        self.cases.insert(action_type, Arc::new(reducer));
        self
    }

    /// Add a `setState` case that replaces the slice with the payload.
    pub fn with_set_state(self) -> Self {
        self.on("setState", |_, payload| payload.clone())
    }

    /// Add a `replaceState` case that replaces the slice with the payload.
    pub fn with_replace_state(self) -> Self {
        self.on("replaceState", |_, payload| payload.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.cases.keys().map(String::as_str)
    }

    fn reduce(&self, state: &Value, action: &Action) -> Option<Value> {
        self.cases
            .get(&action.action_type)
            .map(|reducer| reducer(state, &action.payload))
    }
}

impl fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReducer")
            .field("name", &self.name)
            .field("cases", &self.cases.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-memory reducer store.
pub struct MemoryReducerStore {
    slices: Vec<SliceReducer>,
    state: Mutex<StateMap>,
    listeners: Listeners<()>,
}

impl MemoryReducerStore {
    pub fn new(slices: impl IntoIterator<Item = SliceReducer>) -> Self {
        let slices: Vec<SliceReducer> = slices.into_iter().collect();
        let state = slices
            .iter()
            .map(|slice| (slice.name.clone(), slice.initial.clone()))
            .collect();
        Self {
            slices,
            state: Mutex::new(state),
            listeners: Listeners::new(),
        }
    }

    pub fn get_state(&self) -> StateMap {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ReducerStore for MemoryReducerStore {
    fn state(&self) -> std::result::Result<StateMap, AccessorError> {
        Ok(self.get_state())
    }

    fn dispatch(&self, action: Action) -> std::result::Result<(), AccessorError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            for slice in &self.slices {
                let current = state.get(&slice.name).cloned().unwrap_or(Value::Null);
                if let Some(next) = slice.reduce(&current, &action) {
                    state.insert(slice.name.clone(), next);
                }
            }
        }
        self.listeners.notify(&());
        Ok(())
    }

    fn action_types(&self, slice: &str) -> Vec<String> {
        self.slices
            .iter()
            .filter(|s| s.name == slice)
            .flat_map(|s| s.action_types().map(str::to_string))
            .collect()
    }

    fn subscribe(&self, listener: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.listeners.subscribe(move |_: &()| listener())
    }
}

/// Reads registered slices out of the root state and writes them back by
/// dispatch.
pub struct ReducerAccessor {
    store: Arc<dyn ReducerStore>,
    slices: Vec<String>,
}

impl ReducerAccessor {
    pub fn new(store: Arc<dyn ReducerStore>, slices: Vec<String>) -> Self {
        Self { store, slices }
    }

    fn is_registered(&self, key: &str) -> bool {
        self.slices.iter().any(|slice| slice == key)
    }
}

impl StateAccessor for ReducerAccessor {
    type State = StateMap;

    fn snapshot(&self) -> std::result::Result<StateMap, AccessorError> {
        let root = self.store.state()?;
        Ok(root.subset(self.slices.iter().map(String::as_str)))
    }

    fn patch(&self, partial: StateMap) -> std::result::Result<(), AccessorError> {
        for (key, value) in partial {
            if !self.is_registered(&key) {
                continue;
            }
            let setter = self.store.action_types(&key).into_iter().find(|action_type| {
                action_type.ends_with(SET_STATE_SUFFIX) || action_type.ends_with(REPLACE_STATE_SUFFIX)
            });
            match setter {
                Some(action_type) => self.store.dispatch(Action::new(action_type, value))?,
                None => tracing::warn!(slice = %key, "no setState or replaceState action for slice"),
            }
        }
        Ok(())
    }
}

/// Keeps the registered slices of a reducer store in sync across peers.
pub struct ReducerAdapter {
    binding: Binding<ReducerAccessor>,
}

impl ReducerAdapter {
    /// Bind the `slices` of `store` to a channel and start initial sync.
    ///
    /// Fails with [`AdapterError::EmptySlices`] when `slices` is empty.
    pub fn new<C: Connector>(
        store: Arc<dyn ReducerStore>,
        slices: impl IntoIterator<Item = impl Into<String>>,
        connector: &C,
        options: AdapterOptions,
    ) -> Result<Self> {
        let slices: Vec<String> = slices.into_iter().map(Into::into).collect();
        if slices.is_empty() {
            return Err(AdapterError::EmptySlices);
        }

        let previous = Mutex::new(store.state()?);
        let binding = Binding::new(
            ReducerAccessor::new(Arc::clone(&store), slices.clone()),
            connector,
            options.into_config(REDUCER_CHANNEL),
        )?;

        let broadcaster = binding.broadcaster();
        // Weak, since the store owns this listener.
        let weak_store = Arc::downgrade(&store);
        binding.hold(store.subscribe(Box::new(move || {
            let Some(store) = weak_store.upgrade() else {
                return;
            };
            let next = match store.state() {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(error = %e, "error reading store after dispatch");
                    return;
                }
            };

            let changed: StateMap = {
                let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
                let changed: StateMap = slices
                    .iter()
                    .filter(|slice| previous.get(slice) != next.get(slice))
                    .filter_map(|slice| next.get(slice).map(|v| (slice.clone(), v.clone())))
                    .collect();
                *previous = next;
                changed
            };

            if !changed.is_empty() {
                broadcast_from_listener(&broadcaster, &changed, "changed slices");
            }
        })));

        Ok(Self { binding })
    }

    pub fn manager(&self) -> &ChannelManager<ReducerAccessor> {
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
