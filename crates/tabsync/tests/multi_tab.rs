//! Multi-tab scenarios over the in-memory network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tabsync::core::{MessageType, StateMap, WireMessage};
use tabsync::sync::{state_digest, ChannelManager, SyncOutcome};
use tabsync_testkit::{fast_config, init_test_tracing, todo_item, todo_state, MultiTab, RecordingAccessor};

fn drain(tap: &mut tokio::sync::mpsc::UnboundedReceiver<WireMessage>) -> Vec<WireMessage> {
    let mut out = Vec::new();
    while let Ok(message) = tap.try_recv() {
        out.push(message);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_late_tab_adopts_existing_state() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");

    let first = tabs.open(todo_state()).await?;
    assert_eq!(first.outcome, SyncOutcome::LocalFallback { attempts: 3 });
    let first_id = first.manager.instance_id();

    let second = tabs.open(StateMap::single("filter", json!("done"))).await?;
    assert_eq!(
        second.outcome,
        SyncOutcome::Remote {
            source: first_id,
            attempt: 1
        }
    );
    assert_eq!(second.store.state(), todo_state());
    assert_eq!(
        state_digest(&tabs.tab(0).store.state())?,
        state_digest(&tabs.tab(1).store.state())?
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_change_reaches_every_tab() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");
    for _ in 0..3 {
        tabs.open(todo_state()).await?;
    }

    let todos = json!([todo_item(1, "write the code", true), todo_item(3, "ship", false)]);
    tabs.tab(1).change(StateMap::single("todos", todos.clone()))?;
    tabs.settle().await;

    assert!(tabs.is_converged(), "diverged on {:?}", tabs.divergence());
    assert_eq!(tabs.tab(2).store.state().get("todos"), Some(&todos));
    // Untouched keys survive a partial update.
    assert_eq!(tabs.tab(0).store.state().get("filter"), Some(&json!("all")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_first_responder_wins() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");

    // Two established tabs that disagree.
    tabs.network().set_online(false)?;
    tabs.open(StateMap::single("filter", json!("from-a"))).await?;
    tabs.open(StateMap::single("filter", json!("from-b"))).await?;
    tabs.network().set_online(true)?;
    assert_eq!(tabs.divergence(), vec!["filter".to_string()]);

    let third = tabs.open(StateMap::new()).await?;
    let SyncOutcome::Remote { source, attempt } = third.outcome else {
        panic!("expected a remote outcome, got {:?}", third.outcome);
    };
    assert_eq!(attempt, 1);
    let adopted = third.store.state();

    let responder = tabs
        .tabs()
        .iter()
        .find(|tab| tab.manager.instance_id() == source)
        .expect("responder is one of the tabs");
    assert_eq!(adopted, responder.store.state());

    // The loser's response was discarded, not applied.
    tabs.settle().await;
    assert_eq!(tabs.tab(2).store.patches().len(), 1);
    assert_eq!(tabs.tab(2).manager.stats().responses_discarded, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_echoing_store_does_not_amplify() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");
    tabs.open(todo_state()).await?;
    tabs.open(todo_state()).await?;
    tabs.open(todo_state()).await?;
    for tab in tabs.tabs() {
        tab.echo_patches();
    }

    let mut tap = tabs.network().tap("todos")?;
    tabs.tab(0).change(StateMap::single("filter", json!("active")))?;
    tabs.settle().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let sent = drain(&mut tap);
    assert_eq!(sent.len(), 1, "only the original update travels: {sent:?}");
    assert_eq!(sent[0].kind, MessageType::Update);
    assert!(tabs.is_converged());
    for tab in &tabs.tabs()[1..] {
        assert_eq!(tab.manager.stats().broadcasts_suppressed, 1);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_offline_tabs_keep_local_state() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");
    tabs.network().set_online(false)?;

    tabs.open(todo_state()).await?;
    tabs.open(StateMap::single("filter", json!("done"))).await?;
    for tab in tabs.tabs() {
        assert!(!tab.outcome.is_remote());
    }

    // Broadcasting still succeeds; nobody hears it.
    tabs.tab(0).change(StateMap::single("filter", json!("active")))?;
    tabs.settle().await;
    assert_eq!(
        tabs.tab(1).store.state(),
        StateMap::single("filter", json!("done"))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_closed_tab_leaves_others_working() -> anyhow::Result<()> {
    init_test_tracing();
    let mut tabs = MultiTab::new("todos");
    for _ in 0..3 {
        tabs.open(todo_state()).await?;
    }
    assert_eq!(tabs.network().peer_count("todos")?, 3);

    let closed = tabs.close(1);
    assert!(closed.manager.is_destroyed());
    assert_eq!(tabs.network().peer_count("todos")?, 2);
    assert!(closed.change(StateMap::single("filter", json!("x"))).is_err());

    tabs.tab(0).change(StateMap::single("filter", json!("active")))?;
    tabs.settle().await;
    assert!(tabs.is_converged());
    assert_eq!(closed.store.state().get("filter"), Some(&json!("x")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_initial_sync() -> anyhow::Result<()> {
    init_test_tracing();
    let network = tabsync::MemoryNetwork::new();
    let store = RecordingAccessor::new(todo_state());
    let manager = ChannelManager::new(Arc::clone(&store), &network, fast_config("todos"))?;

    // Mid-way through the first request.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.sync_outcome().is_none());
    assert_eq!(manager.pending_requests(), 1);

    manager.destroy();
    assert_eq!(manager.wait_synced().await, None);
    assert_eq!(manager.pending_requests(), 0);

    // Nothing is applied after teardown.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(store.patches().is_empty());
    Ok(())
}
