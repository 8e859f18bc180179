//! # Tabsync Testkit
//!
//! Testing utilities for tabsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: todo-app state, a recording accessor and a multi-tab
//!   harness over the in-memory network
//! - **Generators**: Proptest strategies for state maps and wire messages
//!
//! ## Multi-tab scenarios
//!
//! ```rust,no_run
//! use tabsync_testkit::fixtures::{todo_state, MultiTab};
//! use tabsync_core::StateMap;
//!
//! async fn example() {
//!     let mut tabs = MultiTab::new("todos");
//!     tabs.open(todo_state()).await.unwrap();
//!     tabs.open(StateMap::new()).await.unwrap();
//!     assert!(tabs.is_converged());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tabsync_testkit::generators::wire_message;
//!
//! proptest! {
//!     #[test]
//!     fn generated_messages_validate(message in wire_message()) {
//!         prop_assert!(message.validate().is_ok());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    fast_config, init_test_tracing, todo_item, todo_state, MultiTab, RecordingAccessor, Tab,
};
