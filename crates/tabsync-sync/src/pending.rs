//! Pending sync table: outstanding state requests awaiting a response.
//!
//! An entry lives from the moment a REQUEST is posted until either its
//! RESPONSE arrives or its timer fires, whichever comes first. The loser of
//! that race finds no entry and does nothing.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use tabsync_core::SyncId;

use crate::error::{Result, SyncError};

struct PendingSync<T> {
    responder: oneshot::Sender<Result<T>>,
    timer: AbortHandle,
}

/// Correlation id to waiter and timeout handle.
pub(crate) struct PendingSyncTable<T> {
    entries: HashMap<SyncId, PendingSync<T>>,
}

impl<T> PendingSyncTable<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a waiter. Replacing a live entry cancels its timer first.
    pub fn insert(&mut self, id: SyncId, responder: oneshot::Sender<Result<T>>, timer: AbortHandle) {
        if let Some(previous) = self.entries.insert(id, PendingSync { responder, timer }) {
            previous.timer.abort();
        }
    }

    pub fn contains(&self, id: &SyncId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Hand `value` to the waiter for `id`. Returns false when no entry exists.
    pub fn resolve(&mut self, id: &SyncId, value: T) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                entry.timer.abort();
                // The waiter may have given up already; nothing to do then.
                let _ = entry.responder.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Fail the waiter for `id` with a timeout. Returns false when no entry
    /// exists (the response won the race).
    pub fn expire(&mut self, id: &SyncId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                let _ = entry.responder.send(Err(SyncError::Timeout(*id)));
                true
            }
            None => false,
        }
    }

    /// Drop one entry without notifying its waiter.
    pub fn cancel(&mut self, id: &SyncId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every timer and fail every waiter with `Cancelled`.
    ///
    /// Returns the number of entries removed.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
            let _ = entry.responder.send(Err(SyncError::Cancelled));
        }
        count
    }
}

impl<T> Default for PendingSyncTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
