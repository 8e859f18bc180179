//! Listener registry and unsubscribe handles shared by the bundled stores.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A change listener.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerSet<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of listeners notified with a `&T` on every change.
pub struct Listeners<T: ?Sized> {
    inner: Arc<Mutex<ListenerSet<T>>>,
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `listener`. It stays registered until the returned handle is
    /// unsubscribed or dropped.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let listener: Listener<T> = Arc::new(listener);
        let id = {
            let mut set = lock(&self.inner);
            let id = set.next_id;
            set.next_id += 1;
            set.entries.push((id, listener));
            id
        };

        let weak: Weak<Mutex<ListenerSet<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(set) = weak.upgrade() {
                lock(&set).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Call every listener with `value`.
    ///
    /// Listeners are called outside the registry lock, so they may subscribe
    /// or unsubscribe while being notified.
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that removes a listener when unsubscribed or dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_every_listener() {
        let listeners = Listeners::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let subs: Vec<_> = (0..3)
            .map(|_| {
                let total = Arc::clone(&total);
                listeners.subscribe(move |v| {
                    total.fetch_add(*v as usize, Ordering::SeqCst);
                })
            })
            .collect();

        listeners.notify(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
        drop(subs);
    }

    #[test]
    fn test_unsubscribe_and_drop_remove_listener() {
        let listeners = Listeners::<()>::new();
        let a = listeners.subscribe(|_| {});
        let b = listeners.subscribe(|_| {});
        assert_eq!(listeners.len(), 2);

        a.unsubscribe();
        assert_eq!(listeners.len(), 1);
        drop(b);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let listeners = Listeners::<()>::new();
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        sub.unsubscribe();
    }
}
