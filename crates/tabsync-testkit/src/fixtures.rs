//! Test fixtures and helpers.
//!
//! Common setup code for multi-tab tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

use tabsync_core::{AccessorError, StateAccessor, StateMap};
use tabsync_sync::{
    verify_convergence, ChannelConfig, ChannelManager, ConvergenceResult, MemoryNetwork, Result,
    SyncError, SyncOutcome,
};

type PatchHook = Box<dyn Fn(&StateMap) + Send + Sync>;

/// A single todo entry.
pub fn todo_item(id: u64, text: &str, done: bool) -> Value {
    json!({ "id": id, "text": text, "done": done })
}

/// Todo-app state: a list of todos and a filter.
pub fn todo_state() -> StateMap {
    let mut state = StateMap::new();
    state.insert(
        "todos",
        json!([todo_item(1, "write the code", true), todo_item(2, "write the tests", false)]),
    );
    state.insert("filter", json!("all"));
    state
}

/// Channel config with short timers, for paused-clock tests.
pub fn fast_config(channel: &str) -> ChannelConfig {
    ChannelConfig::new(channel)
        .with_sync_timeout(Duration::from_millis(100))
        .with_retry_attempts(3)
        .with_retry_delay(Duration::from_millis(50))
}

/// A map-backed store that records every patch it receives.
#[derive(Default)]
pub struct RecordingAccessor {
    state: Mutex<StateMap>,
    patches: Mutex<Vec<StateMap>>,
    on_patch: Mutex<Option<PatchHook>>,
}

impl RecordingAccessor {
    pub fn new(initial: StateMap) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(initial),
            ..Default::default()
        })
    }

    pub fn state(&self) -> StateMap {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every patch applied through the accessor, in order.
    pub fn patches(&self) -> Vec<StateMap> {
        self.patches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Change the store locally, bypassing the patch log.
    pub fn apply_local(&self, partial: StateMap) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(partial);
    }

    /// Run `hook` after every patch, as a store subscriber would.
    pub fn on_patch(&self, hook: impl Fn(&StateMap) + Send + Sync + 'static) {
        *self.on_patch.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }
}

impl StateAccessor for RecordingAccessor {
    type State = StateMap;

    fn snapshot(&self) -> std::result::Result<StateMap, AccessorError> {
        Ok(self.state())
    }

    fn patch(&self, partial: StateMap) -> std::result::Result<(), AccessorError> {
        self.apply_local(partial.clone());
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(partial.clone());
        if let Some(hook) = self
            .on_patch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook(&partial);
        }
        Ok(())
    }
}

/// One peer: a recording store and its channel manager.
pub struct Tab {
    pub store: Arc<RecordingAccessor>,
    pub manager: ChannelManager<Arc<RecordingAccessor>>,
    pub outcome: SyncOutcome,
}

impl Tab {
    /// Make a local change and broadcast it.
    pub fn change(&self, partial: StateMap) -> Result<()> {
        self.store.apply_local(partial.clone());
        self.manager.broadcast_state(&partial)
    }

    /// Make the store re-broadcast every applied patch, like a store whose
    /// subscribers cannot tell remote writes from local ones.
    pub fn echo_patches(&self) {
        let broadcaster = self.manager.broadcaster();
        self.store.on_patch(move |partial| {
            let _ = broadcaster.broadcast(partial);
        });
    }
}

/// Several tabs sharing one in-memory network and channel.
pub struct MultiTab {
    network: Arc<MemoryNetwork>,
    config: ChannelConfig,
    tabs: Vec<Tab>,
}

impl MultiTab {
    pub fn new(channel: &str) -> Self {
        Self::with_config(fast_config(channel))
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            network: MemoryNetwork::new(),
            config,
            tabs: Vec::new(),
        }
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open a tab holding `initial` and wait for its initial sync.
    pub async fn open(&mut self, initial: StateMap) -> Result<&Tab> {
        let store = RecordingAccessor::new(initial);
        let manager = ChannelManager::new(Arc::clone(&store), &self.network, self.config.clone())?;
        let outcome = manager.wait_synced().await.ok_or(SyncError::Closed)?;
        self.tabs.push(Tab {
            store,
            manager,
            outcome,
        });
        Ok(&self.tabs[self.tabs.len() - 1])
    }

    pub fn tab(&self, index: usize) -> &Tab {
        &self.tabs[index]
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// Close a tab, destroying its manager.
    pub fn close(&mut self, index: usize) -> Tab {
        let tab = self.tabs.remove(index);
        tab.manager.destroy();
        tab
    }

    /// Let every in-flight message be delivered and handled.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Keys on which some tab disagrees with the first one.
    pub fn divergence(&self) -> Vec<String> {
        let Some(first) = self.tabs.first() else {
            return Vec::new();
        };
        let reference = first.store.state();

        let mut keys: Vec<String> = Vec::new();
        for tab in &self.tabs[1..] {
            if let ConvergenceResult::Diverged { keys: diverged } =
                verify_convergence(&reference, &tab.store.state())
            {
                keys.extend(diverged);
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn is_converged(&self) -> bool {
        self.divergence().is_empty()
    }
}

/// Install a test-writer tracing subscriber honouring `RUST_LOG`. Safe to
/// call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_multi_tab_open_and_converge() {
        let mut tabs = MultiTab::new("fixtures");
        tabs.open(todo_state()).await.unwrap();
        let second = tabs.open(StateMap::new()).await.unwrap();

        assert!(second.outcome.is_remote());
        assert!(tabs.is_converged());
    }

    #[tokio::test(start_paused = true)]
    async fn test_divergence_reports_keys() {
        let mut tabs = MultiTab::new("fixtures");
        tabs.open(todo_state()).await.unwrap();
        tabs.open(StateMap::new()).await.unwrap();

        tabs.tab(1)
            .store
            .apply_local(StateMap::single("filter", json!("done")));
        assert_eq!(tabs.divergence(), vec!["filter".to_string()]);
    }

    #[test]
    fn test_recording_accessor_logs_patches() {
        let store = RecordingAccessor::new(todo_state());
        store.patch(StateMap::single("filter", json!("active"))).unwrap();
        store.apply_local(StateMap::single("filter", json!("done")));

        assert_eq!(store.patches(), vec![StateMap::single("filter", json!("active"))]);
        assert_eq!(store.state().get("filter"), Some(&json!("done")));
    }
}
