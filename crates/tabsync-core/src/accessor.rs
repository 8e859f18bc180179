//! The accessor contract: how a channel manager reads and writes a store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AccessorError;

/// Snapshot/patch pair supplied by whatever store is being synchronised.
///
/// Both calls are synchronous and may be made from inside message handling.
/// `patch` may synchronously notify the store's subscribers, which in turn may
/// call back into the manager's broadcast path; the manager suppresses those
/// re-broadcasts itself, so accessors need no guard of their own.
pub trait StateAccessor: Send + Sync + 'static {
    /// Full state and partial patches share one type. A patch names a subset
    /// of top-level keys; a snapshot names all of them.
    type State: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Return the current full state.
    fn snapshot(&self) -> Result<Self::State, AccessorError>;

    /// Apply a partial state by key-level replace.
    fn patch(&self, partial: Self::State) -> Result<(), AccessorError>;
}

impl<T: StateAccessor> StateAccessor for std::sync::Arc<T> {
    type State = T::State;

    fn snapshot(&self) -> Result<Self::State, AccessorError> {
        (**self).snapshot()
    }

    fn patch(&self, partial: Self::State) -> Result<(), AccessorError> {
        (**self).patch(partial)
    }
}

/// An accessor built from a getter and a setter closure.
pub struct FnAccessor<S, G, P> {
    get: G,
    set: P,
    _state: std::marker::PhantomData<fn() -> S>,
}

impl<S, G, P> FnAccessor<S, G, P>
where
    G: Fn() -> Result<S, AccessorError>,
    P: Fn(S) -> Result<(), AccessorError>,
{
    pub fn new(get: G, set: P) -> Self {
        Self {
            get,
            set,
            _state: std::marker::PhantomData,
        }
    }
}

impl<S, G, P> StateAccessor for FnAccessor<S, G, P>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    G: Fn() -> Result<S, AccessorError> + Send + Sync + 'static,
    P: Fn(S) -> Result<(), AccessorError> + Send + Sync + 'static,
{
    type State = S;

    fn snapshot(&self) -> Result<S, AccessorError> {
        (self.get)()
    }

    fn patch(&self, partial: S) -> Result<(), AccessorError> {
        (self.set)(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateMap;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fn_accessor_roundtrip() {
        let store = Arc::new(Mutex::new(StateMap::single("count", json!(0))));

        let read = Arc::clone(&store);
        let write = Arc::clone(&store);
        let accessor = FnAccessor::new(
            move || Ok(read.lock().unwrap().clone()),
            move |patch: StateMap| {
                write.lock().unwrap().merge(patch);
                Ok(())
            },
        );

        accessor.patch(StateMap::single("count", json!(3))).unwrap();
        assert_eq!(accessor.snapshot().unwrap().get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_fn_accessor_propagates_errors() {
        let accessor = FnAccessor::new(
            || -> Result<StateMap, AccessorError> { Err(AccessorError::Unavailable) },
            |_: StateMap| Err(AccessorError::store("read-only")),
        );

        assert!(matches!(accessor.snapshot(), Err(AccessorError::Unavailable)));
        assert!(matches!(
            accessor.patch(StateMap::new()),
            Err(AccessorError::Store(_))
        ));
    }
}
