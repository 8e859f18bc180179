//! Convergence checks between peers.
//!
//! Peers converge eventually and only by arrival order, so two tabs can be
//! compared by digesting their snapshots rather than exchanging them.

use std::fmt;

use serde::Serialize;

use tabsync_core::StateMap;

use crate::error::Result;

/// Domain separator for state digests.
const DIGEST_DOMAIN: &[u8] = b"tabsync-state-v0:";

/// Blake3 digest of a state's canonical JSON encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", &self.to_hex()[..16])
    }
}

/// Compute a deterministic digest of `state`.
///
/// The state is first converted to a JSON value, whose object keys are
/// sorted, so two equal states digest identically regardless of how their
/// maps were built.
pub fn state_digest<S: Serialize>(state: &S) -> Result<StateDigest> {
    let canonical = serde_json::to_vec(&serde_json::to_value(state)?)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(&canonical);
    Ok(StateDigest(*hasher.finalize().as_bytes()))
}

/// Result of comparing two peers' snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both peers hold identical state.
    Converged,
    /// These top-level keys differ (or exist on one side only).
    Diverged { keys: Vec<String> },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two snapshots key by key.
pub fn verify_convergence(local: &StateMap, remote: &StateMap) -> ConvergenceResult {
    let keys = local.changed_keys(remote);
    if keys.is_empty() {
        ConvergenceResult::Converged
    } else {
        ConvergenceResult::Diverged { keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_ignores_insertion_order() {
        let mut a = StateMap::new();
        a.insert("todos", json!([]));
        a.insert("filter", json!("all"));

        let mut b = StateMap::new();
        b.insert("filter", json!("all"));
        b.insert("todos", json!([]));

        assert_eq!(state_digest(&a).unwrap(), state_digest(&b).unwrap());
    }

    #[test]
    fn test_digest_sees_nested_changes() {
        let a = StateMap::single("user", json!({ "name": "ada", "tags": [1, 2] }));
        let b = StateMap::single("user", json!({ "name": "ada", "tags": [2, 1] }));
        assert_ne!(state_digest(&a).unwrap(), state_digest(&b).unwrap());
    }

    #[test]
    fn test_verify_convergence() {
        let a = StateMap::single("filter", json!("all"));
        let mut b = a.clone();
        assert!(verify_convergence(&a, &b).is_converged());

        b.insert("filter", json!("active"));
        b.insert("todos", json!([]));
        assert_eq!(
            verify_convergence(&a, &b),
            ConvergenceResult::Diverged {
                keys: vec!["filter".into(), "todos".into()]
            }
        );
    }
}
