//! Shared plumbing for every adapter: the channel manager plus the store
//! subscriptions feeding it.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tabsync_core::{InstanceId, StateAccessor};
use tabsync_sync::{Broadcaster, ChannelConfig, ChannelManager, Connector, SyncError};

use crate::error::Result;
use crate::subscription::Subscription;

/// Sync timeout adapters use unless told otherwise.
pub const ADAPTER_SYNC_TIMEOUT: Duration = Duration::from_millis(3000);
/// Request attempts adapters use unless told otherwise.
pub const ADAPTER_RETRY_ATTEMPTS: u32 = 5;
/// Retry delay adapters use unless told otherwise.
pub const ADAPTER_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Channel options for an adapter. Unset fields take the adapter defaults,
/// and the channel name defaults per adapter kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterOptions {
    pub channel_name: Option<String>,
    pub sync_timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub instance_id: Option<InstanceId>,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn instance_id(mut self, id: InstanceId) -> Self {
        self.instance_id = Some(id);
        self
    }

    /// Resolve into a full channel config.
    pub fn into_config(self, default_channel: &str) -> ChannelConfig {
        ChannelConfig {
            channel_name: self
                .channel_name
                .unwrap_or_else(|| default_channel.to_string()),
            sync_timeout: self.sync_timeout.unwrap_or(ADAPTER_SYNC_TIMEOUT),
            retry_attempts: self.retry_attempts.unwrap_or(ADAPTER_RETRY_ATTEMPTS),
            retry_delay: self.retry_delay.unwrap_or(ADAPTER_RETRY_DELAY),
            instance_id: self.instance_id,
        }
    }
}

/// A channel manager bound to a store through its subscriptions.
///
/// Dropping the binding unsubscribes from the store, then destroys the
/// manager.
pub struct Binding<A: StateAccessor> {
    subscriptions: Mutex<Vec<Subscription>>,
    manager: ChannelManager<A>,
}

impl<A: StateAccessor> Binding<A> {
    pub fn new<C: Connector>(accessor: A, connector: &C, config: ChannelConfig) -> Result<Self> {
        let manager = ChannelManager::new(accessor, connector, config)?;
        Ok(Self {
            subscriptions: Mutex::new(Vec::new()),
            manager,
        })
    }

    pub fn manager(&self) -> &ChannelManager<A> {
        &self.manager
    }

    pub fn broadcaster(&self) -> Broadcaster<A> {
        self.manager.broadcaster()
    }

    /// Keep a store subscription alive for the life of the binding.
    pub fn hold(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Broadcast a partial state, logging failures before returning them.
    pub fn broadcast_state(&self, partial: &A::State) -> std::result::Result<(), SyncError> {
        self.manager.broadcast_state(partial).map_err(|e| {
            tracing::error!(channel = %self.manager.channel_name(), error = %e, "error broadcasting state");
            e
        })
    }

    /// Unsubscribe from the store and destroy the channel. Idempotent.
    pub fn destroy(&self) {
        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.manager.destroy();
    }
}

impl<A: StateAccessor> Drop for Binding<A> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Broadcast from inside a store listener, where errors can only be logged.
pub(crate) fn broadcast_from_listener<A: StateAccessor>(
    broadcaster: &Broadcaster<A>,
    partial: &A::State,
    what: &str,
) {
    if let Err(e) = broadcaster.broadcast(partial) {
        tracing::warn!(what, error = %e, "error broadcasting changed state");
    }
}
