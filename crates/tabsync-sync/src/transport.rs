//! Transport abstraction for the channel protocol.
//!
//! A transport is a best-effort, unordered broadcast medium: a posted message
//! reaches every *other* handle open on the same channel name, never the
//! sender. Delivery, ordering and acknowledgement are not guaranteed.

use async_trait::async_trait;

use tabsync_core::WireMessage;

use crate::error::Result;

/// One open handle on a broadcast channel.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The channel name this handle was opened on.
    fn channel_name(&self) -> &str;

    /// Post a message to every other handle on the channel.
    ///
    /// Fire-and-forget: returning `Ok` says nothing about delivery.
    fn post(&self, message: &WireMessage) -> Result<()>;

    /// Receive the next message delivered to this handle.
    ///
    /// Returns `None` once the handle is closed and drained.
    async fn recv(&self) -> Result<Option<WireMessage>>;

    /// Close the handle. Closing twice is not an error.
    fn close(&self) -> Result<()>;
}

/// Opens transport handles by channel name.
pub trait Connector {
    type Transport: Transport;

    fn open(&self, channel_name: &str) -> Result<Self::Transport>;
}

/// A simple in-memory transport for tests and single-process hosts.
///
/// Every handle opened on a [`MemoryNetwork`] is a peer; posts fan out to the
/// other peers on the same channel name through unbounded channels.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use tokio::sync::mpsc;

    use crate::error::SyncError;

    struct Endpoint {
        handle: u64,
        sender: mpsc::UnboundedSender<WireMessage>,
    }

    struct NetworkInner {
        /// Open endpoints per channel name.
        channels: HashMap<String, Vec<Endpoint>>,
        /// Observers that see every post on a channel, sender included.
        taps: HashMap<String, Vec<mpsc::UnboundedSender<WireMessage>>>,
        next_handle: u64,
        online: bool,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        inner: Mutex<NetworkInner>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn lock(&self) -> Result<MutexGuard<'_, NetworkInner>> {
            self.inner
                .lock()
                .map_err(|_| SyncError::TransportError("network lock poisoned".into()))
        }

        /// Open a handle on `channel_name`.
        pub fn create_transport(self: &Arc<Self>, channel_name: &str) -> Result<MemoryTransport> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut inner = self.lock()?;

            let handle = inner.next_handle;
            inner.next_handle += 1;
            inner
                .channels
                .entry(channel_name.to_string())
                .or_default()
                .push(Endpoint { handle, sender: tx });

            Ok(MemoryTransport {
                handle,
                channel: channel_name.to_string(),
                network: Arc::clone(self),
                receiver: tokio::sync::Mutex::new(rx),
                closed: AtomicBool::new(false),
            })
        }

        /// Observe every message posted on `channel_name` from now on.
        pub fn tap(&self, channel_name: &str) -> Result<mpsc::UnboundedReceiver<WireMessage>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lock()?
                .taps
                .entry(channel_name.to_string())
                .or_default()
                .push(tx);
            Ok(rx)
        }

        /// Toggle delivery. While offline every post is silently dropped.
        pub fn set_online(&self, online: bool) -> Result<()> {
            self.lock()?.online = online;
            Ok(())
        }

        /// Number of open handles on a channel.
        pub fn peer_count(&self, channel_name: &str) -> Result<usize> {
            Ok(self
                .lock()?
                .channels
                .get(channel_name)
                .map_or(0, Vec::len))
        }

        fn deliver(&self, channel: &str, from: u64, message: &WireMessage) -> Result<()> {
            let mut inner = self.lock()?;

            if let Some(taps) = inner.taps.get_mut(channel) {
                taps.retain(|tap| tap.send(message.clone()).is_ok());
            }

            if !inner.online {
                tracing::trace!(channel, "network offline, dropping post");
                return Ok(());
            }

            if let Some(endpoints) = inner.channels.get(channel) {
                for endpoint in endpoints.iter().filter(|e| e.handle != from) {
                    // Ignore errors for broadcast (receiver may be mid-teardown)
                    let _ = endpoint.sender.send(message.clone());
                }
            }
            Ok(())
        }

        fn detach(&self, channel: &str, handle: u64) -> Result<()> {
            let mut inner = self.lock()?;
            if let Some(endpoints) = inner.channels.get_mut(channel) {
                endpoints.retain(|e| e.handle != handle);
                if endpoints.is_empty() {
                    inner.channels.remove(channel);
                }
            }
            Ok(())
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                inner: Mutex::new(NetworkInner {
                    channels: HashMap::new(),
                    taps: HashMap::new(),
                    next_handle: 0,
                    online: true,
                }),
            }
        }
    }

    impl Connector for Arc<MemoryNetwork> {
        type Transport = MemoryTransport;

        fn open(&self, channel_name: &str) -> Result<MemoryTransport> {
            self.create_transport(channel_name)
        }
    }

    /// In-memory transport handle.
    pub struct MemoryTransport {
        handle: u64,
        channel: String,
        network: Arc<MemoryNetwork>,
        receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<WireMessage>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn channel_name(&self) -> &str {
            &self.channel
        }

        fn post(&self, message: &WireMessage) -> Result<()> {
            if self.closed.load(Ordering::Acquire) {
                return Err(SyncError::Closed);
            }
            self.network.deliver(&self.channel, self.handle, message)
        }

        async fn recv(&self) -> Result<Option<WireMessage>> {
            let mut rx = self.receiver.lock().await;
            Ok(rx.recv().await)
        }

        fn close(&self) -> Result<()> {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            // Dropping our sender ends any pending recv.
            self.network.detach(&self.channel, self.handle)
        }
    }

    impl Drop for MemoryTransport {
        fn drop(&mut self) {
            let _ = self.close();
        }
    }
}
