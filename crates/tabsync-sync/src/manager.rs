//! The channel manager: one peer's view of a shared state channel.
//!
//! A manager owns one transport handle. It stamps outbound messages with its
//! instance id, drops its own echoes, serialises inbound handling through a
//! FIFO queue, answers state requests, applies peers' updates through the
//! store accessor, and acquires an initial snapshot from peers on startup.
//!
//! ## Message Flow
//!
//! ```text
//! New tab B                           Existing tab A
//!   |-------- SYNC_START(s) ---------->|
//!   |-------- REQUEST(r) ------------->|
//!   |<------- RESPONSE(r, snapshot) ---|
//!   |  (patch snapshot locally)        |
//!   |-------- SYNC_END(s) ------------>|
//!   |                                  |
//!   |<------- UPDATE(partial) ---------|   local change in A
//!   |-------- UPDATE(partial) -------->|   local change in B
//! ```
//!
//! If no RESPONSE arrives within `sync_timeout`, the REQUEST is re-issued
//! after `retry_delay`, up to `retry_attempts` requests in total; after that
//! the local snapshot is adopted as the initial state.
//!
//! Every write into the store, the initial state included, runs from the
//! inbound queue's single drain, so two patches never overlap even when
//! messages are delivered on different runtime workers.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use tabsync_core::{
    now_millis, InstanceId, MessageError, MessageType, StateAccessor, SyncId, WireMessage,
};

use crate::config::ChannelConfig;
use crate::error::{Result, SyncError};
use crate::pending::PendingSyncTable;
use crate::queue::{InboundQueue, Queued};
use crate::stats::{ChannelStats, StatsRecorder, SyncOutcome};
use crate::transport::{Connector, Transport};

/// A RESPONSE that resolved a pending request.
struct Arrival<S> {
    state: S,
    source: InstanceId,
}

/// Recover the data from a poisoned lock; every critical section here leaves
/// its structure consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initial state ready to be written into the store.
struct Acquired<S> {
    sync_id: SyncId,
    state: Option<S>,
    outcome: SyncOutcome,
}

/// Work for the inbound queue. Every store patch is one of these.
enum Inbound<S> {
    Message(WireMessage),
    Acquired(Acquired<S>),
}

/// Scoped hold on the "applying a received update" marker.
///
/// The marker names the thread doing the apply. Store patches are
/// synchronous, so a broadcast from that thread while the marker is held comes
/// from the patch's own call stack; a broadcast from any other thread is a
/// real local change. Released on drop, unwinds included.
struct ReceivingGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> ReceivingGuard<'a> {
    /// Take the marker, or `None` if an application is already in progress.
    fn try_acquire(slot: &'a Mutex<Option<ThreadId>>) -> Option<Self> {
        let mut holder = lock(slot);
        if holder.is_some() {
            return None;
        }
        *holder = Some(thread::current().id());
        Some(Self(slot))
    }

    fn held_by_current_thread(slot: &Mutex<Option<ThreadId>>) -> bool {
        *lock(slot) == Some(thread::current().id())
    }
}

impl Drop for ReceivingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct Inner<A: StateAccessor> {
    accessor: A,
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    instance_id: InstanceId,
    /// Thread currently patching received state into the store.
    receiving: Mutex<Option<ThreadId>>,
    destroyed: AtomicBool,
    queue: Mutex<InboundQueue<Inbound<A::State>>>,
    pending: Mutex<PendingSyncTable<Arrival<A::State>>>,
    /// Listener and initial-sync tasks, aborted on destroy.
    tasks: Mutex<Vec<AbortHandle>>,
    synced: watch::Sender<Option<SyncOutcome>>,
    stats: StatsRecorder,
}

/// One peer on a broadcast channel, synchronising the state behind `A`.
///
/// Dropping the manager destroys it.
pub struct ChannelManager<A: StateAccessor> {
    inner: Arc<Inner<A>>,
}

impl<A: StateAccessor> ChannelManager<A> {
    /// Open the channel and start initial-state acquisition.
    ///
    /// Returns as soon as the transport is open; acquisition runs in the
    /// background (see [`ChannelManager::wait_synced`]). Must be called from
    /// within a tokio runtime.
    pub fn new<C: Connector>(accessor: A, connector: &C, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let transport: Arc<dyn Transport> = Arc::new(connector.open(&config.channel_name)?);
        let instance_id = config.instance_id.unwrap_or_else(InstanceId::random);
        let (synced, _) = watch::channel(None);

        let inner = Arc::new(Inner {
            accessor,
            transport: Arc::clone(&transport),
            config,
            instance_id,
            receiving: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            queue: Mutex::new(InboundQueue::new()),
            pending: Mutex::new(PendingSyncTable::new()),
            tasks: Mutex::new(Vec::new()),
            synced,
            stats: StatsRecorder::default(),
        });

        tracing::debug!(
            instance = %instance_id,
            channel = %inner.config.channel_name,
            "opening channel"
        );

        let listener = runtime.spawn(listen(transport, Arc::downgrade(&inner)));
        let init = runtime.spawn(Arc::clone(&inner).initialize());
        lock(&inner.tasks).extend([listener.abort_handle(), init.abort_handle()]);

        Ok(Self { inner })
    }

    pub fn instance_id(&self) -> InstanceId {
        self.inner.instance_id
    }

    pub fn channel_name(&self) -> &str {
        &self.inner.config.channel_name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn accessor(&self) -> &A {
        &self.inner.accessor
    }

    /// Post a local change to every peer.
    ///
    /// Suppressed (returns `Ok` without posting) while a received update is
    /// being applied, so a store that reports the applied change as a new
    /// local change does not echo it back. Best-effort: `Ok` means the post
    /// was handed to the transport, not that anyone received it.
    pub fn broadcast_state(&self, partial: &A::State) -> Result<()> {
        self.inner.broadcast_state(partial)
    }

    /// A weak handle for store subscriptions to broadcast through.
    pub fn broadcaster(&self) -> Broadcaster<A> {
        Broadcaster {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a message as if it came from the transport.
    pub fn handle_message(&self, message: WireMessage) {
        self.inner.handle_message(message);
    }

    /// Wait for initial-state acquisition to finish.
    ///
    /// Returns `None` if the manager is destroyed first.
    pub async fn wait_synced(&self) -> Option<SyncOutcome> {
        let mut rx = self.inner.synced.subscribe();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return Some(outcome);
            }
            if self.inner.is_destroyed() {
                return None;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// The acquisition outcome, if acquisition has finished.
    pub fn sync_outcome(&self) -> Option<SyncOutcome> {
        *self.inner.synced.borrow()
    }

    pub fn stats(&self) -> ChannelStats {
        self.inner.stats.snapshot()
    }

    /// Number of state requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Tear the channel down: cancel pending requests and their timers, drop
    /// queued messages, stop listening and close the transport.
    ///
    /// Safe to call any number of times.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl<A: StateAccessor> Drop for ChannelManager<A> {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

/// Weak handle to a manager's broadcast path.
///
/// Held by store subscriptions so the store does not keep the manager alive.
pub struct Broadcaster<A: StateAccessor> {
    inner: Weak<Inner<A>>,
}

impl<A: StateAccessor> Broadcaster<A> {
    /// Same as [`ChannelManager::broadcast_state`]; `Closed` once the manager
    /// is gone.
    pub fn broadcast(&self, partial: &A::State) -> Result<()> {
        match self.inner.upgrade() {
            Some(inner) => inner.broadcast_state(partial),
            None => Err(SyncError::Closed),
        }
    }
}

impl<A: StateAccessor> Clone for Broadcaster<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Forward transport deliveries into the manager until either side goes away.
async fn listen<A: StateAccessor>(transport: Arc<dyn Transport>, inner: Weak<Inner<A>>) {
    loop {
        match transport.recv().await {
            Ok(Some(message)) => match inner.upgrade() {
                Some(inner) => inner.handle_message(message),
                None => break,
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "transport receive failed, listener stopping");
                break;
            }
        }
    }
}

impl<A: StateAccessor> Inner<A> {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn post(&self, message: &WireMessage) -> Result<()> {
        self.transport.post(message).map_err(|e| {
            tracing::warn!(
                instance = %self.instance_id,
                kind = ?message.kind,
                error = %e,
                "post failed"
            );
            e
        })
    }

    fn broadcast_state(&self, partial: &A::State) -> Result<()> {
        if ReceivingGuard::held_by_current_thread(&self.receiving) {
            StatsRecorder::bump(&self.stats.broadcasts_suppressed);
            tracing::trace!(instance = %self.instance_id, "broadcast suppressed while applying received state");
            return Ok(());
        }
        if self.is_destroyed() {
            return Err(SyncError::Closed);
        }

        let state = serde_json::to_value(partial)?;
        self.post(&WireMessage::update(self.instance_id, state))?;
        StatsRecorder::bump(&self.stats.broadcasts_sent);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_message(&self, message: WireMessage) {
        if message.is_from(&self.instance_id) {
            StatsRecorder::bump(&self.stats.self_echoes);
            return;
        }
        if self.is_destroyed() {
            return;
        }
        self.enqueue(Inbound::Message(message));
    }

    fn enqueue(&self, item: Inbound<A::State>) {
        let start_drain = lock(&self.queue).push(item, now_millis());
        if start_drain {
            self.drain();
        }
    }

    fn drain(&self) {
        loop {
            let Some(Queued { item, received_at }) = lock(&self.queue).pop() else {
                break;
            };
            let (kind, source) = match &item {
                Inbound::Message(message) => (Some(message.kind), Some(message.source)),
                Inbound::Acquired(_) => (None, None),
            };

            // A panicking store must not leave the queue without a drainer.
            let error = match catch_unwind(AssertUnwindSafe(|| self.process(item))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("handler panicked: {}", panic_message(&*payload)),
            };
            StatsRecorder::bump(&self.stats.handler_errors);
            tracing::warn!(
                instance = %self.instance_id,
                source = ?source,
                ?kind,
                received_at,
                %error,
                "error processing message"
            );
        }
    }

    fn process(&self, item: Inbound<A::State>) -> Result<()> {
        match item {
            Inbound::Message(message) => self.dispatch(message),
            Inbound::Acquired(acquired) => {
                self.complete_sync(acquired);
                Ok(())
            }
        }
    }

    /// Patch received state into the store with the marker held. Returns
    /// false, without patching, if an application is already in progress.
    fn apply_received(&self, state: A::State) -> Result<bool> {
        let Some(_guard) = ReceivingGuard::try_acquire(&self.receiving) else {
            StatsRecorder::bump(&self.stats.updates_nested);
            return Ok(false);
        };
        self.accessor.patch(state)?;
        Ok(true)
    }

    fn dispatch(&self, message: WireMessage) -> Result<()> {
        message.validate()?;

        match message.kind {
            MessageType::Request => self.on_request(message),
            MessageType::Response => self.on_response(message),
            MessageType::Update => self.on_update(message),
            MessageType::SyncStart => {
                tracing::debug!(source = %message.source, sync_id = ?message.id, "peer sync started");
                Ok(())
            }
            MessageType::SyncEnd => {
                tracing::debug!(source = %message.source, sync_id = ?message.id, "peer sync ended");
                Ok(())
            }
        }
    }

    fn on_request(&self, message: WireMessage) -> Result<()> {
        let id = message.id.ok_or(MessageError::MissingId(message.kind))?;

        let snapshot = self.accessor.snapshot()?;
        let state = serde_json::to_value(&snapshot)?;
        self.post(&WireMessage::response(self.instance_id, id, state))?;

        StatsRecorder::bump(&self.stats.requests_answered);
        tracing::debug!(instance = %self.instance_id, requester = %message.source, ?id, "answered state request");
        Ok(())
    }

    fn on_response(&self, message: WireMessage) -> Result<()> {
        let id = message.id.ok_or(MessageError::MissingId(message.kind))?;

        if !lock(&self.pending).contains(&id) {
            StatsRecorder::bump(&self.stats.responses_discarded);
            tracing::trace!(?id, source = %message.source, "response without pending request");
            return Ok(());
        }

        let value = message.state.ok_or(MessageError::MissingState(message.kind))?;
        let state: A::State = serde_json::from_value(value)?;
        let arrival = Arrival {
            state,
            source: message.source,
        };

        if lock(&self.pending).resolve(&id, arrival) {
            StatsRecorder::bump(&self.stats.responses_accepted);
        } else {
            StatsRecorder::bump(&self.stats.responses_discarded);
        }
        Ok(())
    }

    fn on_update(&self, message: WireMessage) -> Result<()> {
        let value = message.state.ok_or(MessageError::MissingState(message.kind))?;
        let partial: A::State = serde_json::from_value(value)?;

        if self.apply_received(partial)? {
            StatsRecorder::bump(&self.stats.updates_applied);
        } else {
            tracing::debug!(source = %message.source, "update arrived mid-application, dropped");
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initial-state acquisition
    // ─────────────────────────────────────────────────────────────────────────

    async fn initialize(self: Arc<Self>) {
        let sync_id = SyncId::random();
        // SYNC_START is advisory; a failed post does not stop acquisition.
        let _ = self.post(&WireMessage::sync_start(self.instance_id, sync_id));

        let (state, outcome) = match self.acquire_initial_state().await {
            Ok(acquired) => acquired,
            Err(SyncError::Cancelled) => return,
            Err(e) => {
                tracing::warn!(instance = %self.instance_id, error = %e, "no initial state available");
                (None, SyncOutcome::LocalFallback { attempts: self.config.retry_attempts })
            }
        };
        if self.is_destroyed() {
            return;
        }

        // Applied from the inbound queue so it never overlaps a peer's update.
        self.enqueue(Inbound::Acquired(Acquired {
            sync_id,
            state,
            outcome,
        }));
    }

    fn complete_sync(&self, acquired: Acquired<A::State>) {
        if self.is_destroyed() {
            return;
        }

        if let Some(state) = acquired.state {
            if let Err(e) = self.apply_received(state) {
                tracing::warn!(instance = %self.instance_id, error = %e, "failed to apply initial state");
            }
        }

        let _ = self.post(&WireMessage::sync_end(self.instance_id, acquired.sync_id));

        tracing::info!(
            instance = %self.instance_id,
            channel = %self.config.channel_name,
            outcome = ?acquired.outcome,
            "initial state acquired"
        );
        self.synced.send_replace(Some(acquired.outcome));
    }

    async fn acquire_initial_state(self: &Arc<Self>) -> Result<(Option<A::State>, SyncOutcome)> {
        let attempts = self.config.retry_attempts;

        for attempt in 1..=attempts {
            match self.request_state().await {
                Ok(arrival) => {
                    let outcome = SyncOutcome::Remote {
                        source: arrival.source,
                        attempt,
                    };
                    return Ok((Some(arrival.state), outcome));
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::debug!(instance = %self.instance_id, attempt, error = %e, "state request failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        // Nobody answered: this peer is authoritative.
        let local = self.accessor.snapshot()?;
        Ok((Some(local), SyncOutcome::LocalFallback { attempts }))
    }

    async fn request_state(self: &Arc<Self>) -> Result<Arrival<A::State>> {
        if self.is_destroyed() {
            return Err(SyncError::Cancelled);
        }

        let id = SyncId::random();
        let (tx, rx) = oneshot::channel();

        {
            // Timer is registered under the lock so it cannot fire before the
            // entry exists.
            let mut pending = lock(&self.pending);
            let weak = Arc::downgrade(self);
            let timeout = self.config.sync_timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    lock(&inner.pending).expire(&id);
                }
            });
            pending.insert(id, tx, timer.abort_handle());
        }

        if let Err(e) = self.post(&WireMessage::request(self.instance_id, id)) {
            lock(&self.pending).cancel(&id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Cancelled),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────────

    fn destroy(&self) {
        let first = !self.destroyed.swap(true, Ordering::AcqRel);

        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        let cancelled = lock(&self.pending).cancel_all();
        lock(&self.queue).clear();
        if let Err(e) = self.transport.close() {
            tracing::warn!(instance = %self.instance_id, error = %e, "transport close failed");
        }
        // Wake anyone in wait_synced.
        self.synced.send_modify(|_| {});

        if first {
            tracing::debug!(
                instance = %self.instance_id,
                channel = %self.config.channel_name,
                cancelled,
                "channel destroyed"
            );
        }
    }
}
