//! Property tests over whole tabs.

use proptest::prelude::*;

use tabsync::core::StateMap;
use tabsync_testkit::generators::state_map;
use tabsync_testkit::MultiTab;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Updates from several tabs, applied in arrival order, leave every tab
    /// holding the same state as a single map that saw the same patches.
    #[test]
    fn test_tabs_converge_on_sequential_updates(
        initial in state_map(4),
        changes in prop::collection::vec((0usize..3, state_map(3)), 1..12),
    ) {
        let runtime = paused_runtime();
        let (expected, first, divergence) = runtime.block_on(async {
            let mut tabs = MultiTab::new("props");
            tabs.open(initial.clone()).await.expect("open");
            tabs.open(StateMap::new()).await.expect("open");
            tabs.open(StateMap::new()).await.expect("open");

            let mut expected = initial.clone();
            for (index, patch) in &changes {
                tabs.tab(*index).change(patch.clone()).expect("broadcast");
                expected.merge(patch.clone());
                tabs.settle().await;
            }
            (expected, tabs.tab(0).store.state(), tabs.divergence())
        });

        prop_assert!(divergence.is_empty(), "diverged on {:?}", divergence);
        prop_assert_eq!(first, expected);
    }
}
