//! Binding for observable stores: one object with tracked fields, written in
//! batched actions.
//!
//! Observers hear about a batch once, after it completes. The adapter keeps
//! the previous value of every tracked field and broadcasts only those whose
//! value changed.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use tabsync_core::{AccessorError, StateAccessor, StateMap};
use tabsync_sync::{ChannelManager, Connector, SyncOutcome};

use crate::binding::{broadcast_from_listener, AdapterOptions, Binding};
use crate::error::{AdapterError, Result};
use crate::subscription::{Listeners, Subscription};

/// Channel used when the options name none.
pub const OBSERVABLE_CHANNEL: &str = "observable-channel";

/// An object of named fields whose observers run after each action.
pub struct ObservableStore {
    fields: Mutex<StateMap>,
    observers: Listeners<()>,
}

impl ObservableStore {
    pub fn new(fields: StateMap) -> Self {
        Self {
            fields: Mutex::new(fields),
            observers: Listeners::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Set one field as its own action.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.run_in_action(move |fields| {
            fields.insert(key, value);
        });
    }

    /// Run `action` against the fields as one batch. Observers are notified
    /// once afterwards, and only if something changed.
    ///
    /// `action` must not call back into the store.
    pub fn run_in_action<R>(&self, action: impl FnOnce(&mut StateMap) -> R) -> R {
        let (result, changed) = {
            let mut fields = self.lock();
            let before = fields.clone();
            let result = action(&mut *fields);
            (result, *fields != before)
        };
        if changed {
            self.observers.notify(&());
        }
        result
    }

    pub fn snapshot(&self) -> StateMap {
        self.lock().clone()
    }

    /// Run `observer` after every action that changes the store.
    pub fn observe(&self, observer: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.observers.subscribe(move |_: &()| observer())
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateMap> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads and writes the tracked fields of an [`ObservableStore`].
pub struct ObservableAccessor {
    store: Arc<ObservableStore>,
    keys: Vec<String>,
}

impl ObservableAccessor {
    pub fn new(store: Arc<ObservableStore>, keys: Vec<String>) -> Self {
        Self { store, keys }
    }
}

impl StateAccessor for ObservableAccessor {
    type State = StateMap;

    fn snapshot(&self) -> std::result::Result<StateMap, AccessorError> {
        Ok(self.store.snapshot().subset(self.keys.iter().map(String::as_str)))
    }

    /// Writes every tracked field that already exists, in a single action.
    fn patch(&self, partial: StateMap) -> std::result::Result<(), AccessorError> {
        self.store.run_in_action(|fields| {
            for (key, value) in partial {
                if self.keys.contains(&key) && fields.contains_key(&key) {
                    fields.insert(key, value);
                }
            }
        });
        Ok(())
    }
}

/// Keeps the tracked fields of an observable store in sync across peers.
pub struct ObservableAdapter {
    binding: Binding<ObservableAccessor>,
}

impl ObservableAdapter {
    /// Bind the tracked `keys` of `store` to a channel and start initial sync.
    ///
    /// Fails with [`AdapterError::EmptyKeys`] when `keys` is empty.
    pub fn new<C: Connector>(
        store: Arc<ObservableStore>,
        keys: impl IntoIterator<Item = impl Into<String>>,
        connector: &C,
        options: AdapterOptions,
    ) -> Result<Self> {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(AdapterError::EmptyKeys);
        }

        let previous = Mutex::new(store.snapshot().subset(keys.iter().map(String::as_str)));
        let binding = Binding::new(
            ObservableAccessor::new(Arc::clone(&store), keys.clone()),
            connector,
            options.into_config(OBSERVABLE_CHANNEL),
        )?;

        let broadcaster = binding.broadcaster();
        let weak_store = Arc::downgrade(&store);
        binding.hold(store.observe(move || {
            let Some(store) = weak_store.upgrade() else {
                return;
            };
            let next = store.snapshot().subset(keys.iter().map(String::as_str));

            let changed: StateMap = {
                let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
                let changed: StateMap = previous
                    .changed_keys(&next)
                    .into_iter()
                    .filter_map(|key| {
                        let value = next.get(&key)?.clone();
                        Some((key, value))
                    })
                    .collect();
                *previous = next;
                changed
            };

            if !changed.is_empty() {
                broadcast_from_listener(&broadcaster, &changed, "changed fields");
            }
        }));

        Ok(Self { binding })
    }

    pub fn manager(&self) -> &ChannelManager<ObservableAccessor> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tabsync_sync::MemoryNetwork;

    fn todo_store() -> Arc<ObservableStore> {
        let mut fields = StateMap::new();
        fields.insert("todos", json!([{ "id": 1, "text": "plan", "done": false }]));
        fields.insert("filter", json!("all"));
        fields.insert("draft", json!(""));
        Arc::new(ObservableStore::new(fields))
    }

    fn options() -> AdapterOptions {
        AdapterOptions::new()
            .sync_timeout(Duration::from_millis(100))
            .retry_attempts(2)
            .retry_delay(Duration::from_millis(50))
    }

    #[test]
    fn test_batch_notifies_once() {
        let store = todo_store();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = store.observe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.run_in_action(|fields| {
            fields.insert("filter", json!("active"));
            fields.insert("draft", json!("buy milk"));
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Writing the same values is not a change.
        store.set("filter", json!("active"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_patch_skips_untracked_and_missing_fields() {
        let store = todo_store();
        let accessor = ObservableAccessor::new(Arc::clone(&store), vec!["filter".into(), "extra".into()]);

        let mut patch = StateMap::single("filter", json!("done"));
        patch.insert("draft", json!("nope"));
        patch.insert("extra", json!(1));
        accessor.patch(patch).unwrap();

        assert_eq!(store.get("filter"), Some(json!("done")));
        assert_eq!(store.get("draft"), Some(json!("")));
        assert_eq!(store.get("extra"), None);
        assert_eq!(
            accessor.snapshot().unwrap(),
            StateMap::single("filter", json!("done"))
        );
    }

    #[test]
    fn test_empty_keys_rejected() {
        let network = MemoryNetwork::new();
        let result = ObservableAdapter::new(todo_store(), Vec::<String>::new(), &network, options());
        assert!(matches!(result, Err(AdapterError::EmptyKeys)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_change_is_detected_and_broadcast() {
        let network = MemoryNetwork::new();
        let mut tap = network.tap(OBSERVABLE_CHANNEL).unwrap();
        let store = todo_store();
        let adapter =
            ObservableAdapter::new(Arc::clone(&store), ["todos", "filter"], &network, options())
                .unwrap();
        adapter.wait_synced().await.unwrap();
        while tap.try_recv().is_ok() {}

        store.run_in_action(|fields| {
            fields.insert("todos", json!([{ "id": 1, "text": "plan", "done": true }]));
            fields.insert("draft", json!("untracked"));
        });

        let update = tap.try_recv().unwrap();
        assert_eq!(
            update.state,
            Some(json!({ "todos": [{ "id": 1, "text": "plan", "done": true }] }))
        );
        assert!(tap.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peers_converge_on_tracked_fields() {
        let network = MemoryNetwork::new();
        let store_a = todo_store();
        let a = ObservableAdapter::new(Arc::clone(&store_a), ["todos", "filter"], &network, options())
            .unwrap();
        a.wait_synced().await.unwrap();

        let store_b = Arc::new(ObservableStore::new(StateMap::single("filter", json!("none"))));
        store_b.set("todos", json!([]));
        let b = ObservableAdapter::new(Arc::clone(&store_b), ["todos", "filter"], &network, options())
            .unwrap();
        assert!(b.wait_synced().await.unwrap().is_remote());
        assert_eq!(store_b.get("todos"), store_a.get("todos"));
        assert_eq!(store_b.get("filter"), Some(json!("all")));

        store_b.set("filter", json!("done"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store_a.get("filter"), Some(json!("done")));
        assert_eq!(a.manager().stats().broadcasts_suppressed, 1);
        assert_eq!(store_a.observer_count(), 1);
    }
}
