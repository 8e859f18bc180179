//! Key-level state maps.
//!
//! A [`StateMap`] is the shape every bundled adapter synchronises: top-level
//! keys mapped to whole JSON values. A patch names a subset of keys and
//! replaces each one entirely; nested values are never merged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level keys to JSON values, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap(BTreeMap<String, Value>);

impl StateMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a single-key map.
    pub fn single(key: impl Into<String>, value: Value) -> Self {
        let mut map = Self::new();
        map.insert(key, value);
        map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Apply a patch: every key in `patch` replaces the key here.
    pub fn merge(&mut self, patch: StateMap) {
        for (key, value) in patch.0 {
            self.0.insert(key, value);
        }
    }

    /// Keys whose value differs between `self` and `other`, including keys
    /// present on only one side.
    pub fn changed_keys(&self, other: &StateMap) -> Vec<String> {
        let mut keys: Vec<String> = self
            .0
            .iter()
            .filter(|(k, v)| other.0.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        keys.extend(
            other
                .0
                .keys()
                .filter(|k| !self.0.contains_key(*k))
                .cloned(),
        );
        keys.sort();
        keys
    }

    /// Copy out the listed keys that are present.
    pub fn subset<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> StateMap {
        let mut out = StateMap::new();
        for key in keys {
            if let Some(value) = self.0.get(key) {
                out.insert(key, value.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, Value)> for StateMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for StateMap {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, Value>> for StateMap {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn todo_state() -> StateMap {
        let mut state = StateMap::new();
        state.insert("todos", json!([{ "id": 1, "text": "write tests", "done": false }]));
        state.insert("filter", json!("all"));
        state
    }

    #[test]
    fn test_merge_replaces_only_named_keys() {
        let mut state = todo_state();
        state.merge(StateMap::single("filter", json!("active")));

        assert_eq!(state.get("filter"), Some(&json!("active")));
        assert_eq!(state.get("todos"), todo_state().get("todos"));
    }

    #[test]
    fn test_merge_is_not_deep() {
        let mut state = StateMap::single("user", json!({ "name": "ada", "theme": "dark" }));
        state.merge(StateMap::single("user", json!({ "name": "grace" })));

        assert_eq!(state.get("user"), Some(&json!({ "name": "grace" })));
    }

    #[test]
    fn test_changed_keys() {
        let before = todo_state();
        let mut after = todo_state();
        after.insert("filter", json!("done"));
        after.insert("extra", json!(1));

        assert_eq!(before.changed_keys(&after), vec!["extra", "filter"]);
        assert!(before.changed_keys(&before).is_empty());
    }

    #[test]
    fn test_subset_skips_missing() {
        let subset = todo_state().subset(["filter", "missing"]);
        assert_eq!(subset.len(), 1);
        assert!(subset.contains_key("filter"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let value = serde_json::to_value(todo_state()).unwrap();
        assert_eq!(value["filter"], "all");
    }

    proptest! {
        #[test]
        fn test_merge_last_patch_wins(
            a in prop::collection::btree_map("[a-d]", any::<i64>(), 0..4),
            b in prop::collection::btree_map("[a-d]", any::<i64>(), 0..4),
        ) {
            let to_map = |m: &BTreeMap<String, i64>| -> StateMap {
                m.iter().map(|(k, v)| (k.clone(), json!(v))).collect()
            };

            let mut state = StateMap::new();
            state.merge(to_map(&a));
            state.merge(to_map(&b));

            for (k, v) in &b {
                prop_assert_eq!(state.get(k), Some(&json!(v)));
            }
            for (k, v) in &a {
                if !b.contains_key(k) {
                    prop_assert_eq!(state.get(k), Some(&json!(v)));
                }
            }
        }
    }
}
