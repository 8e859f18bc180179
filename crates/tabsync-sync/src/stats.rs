//! Per-channel counters.

use std::sync::atomic::{AtomicU64, Ordering};

use tabsync_core::InstanceId;

/// How initial-state acquisition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A peer answered; its snapshot was applied.
    Remote {
        /// The responding peer.
        source: InstanceId,
        /// Which request attempt (1-based) was answered.
        attempt: u32,
    },
    /// Nobody answered; the local snapshot was kept.
    LocalFallback {
        /// Requests issued before giving up.
        attempts: u32,
    },
}

impl SyncOutcome {
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncOutcome::Remote { .. })
    }
}

/// Point-in-time copy of a channel's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Inbound UPDATEs patched into the store.
    pub updates_applied: u64,
    /// Inbound UPDATEs dropped because another application was in progress.
    pub updates_nested: u64,
    /// REQUESTs answered with a snapshot.
    pub requests_answered: u64,
    /// RESPONSEs that resolved a pending request.
    pub responses_accepted: u64,
    /// RESPONSEs with no matching pending request.
    pub responses_discarded: u64,
    /// Messages dropped because they carried our own instance id.
    pub self_echoes: u64,
    /// Queued messages whose handler failed or panicked.
    pub handler_errors: u64,
    /// UPDATEs posted by `broadcast_state`.
    pub broadcasts_sent: u64,
    /// `broadcast_state` calls suppressed by the reentrancy flag.
    pub broadcasts_suppressed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    pub updates_applied: AtomicU64,
    pub updates_nested: AtomicU64,
    pub requests_answered: AtomicU64,
    pub responses_accepted: AtomicU64,
    pub responses_discarded: AtomicU64,
    pub self_echoes: AtomicU64,
    pub handler_errors: AtomicU64,
    pub broadcasts_sent: AtomicU64,
    pub broadcasts_suppressed: AtomicU64,
}

impl StatsRecorder {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ChannelStats {
            updates_applied: load(&self.updates_applied),
            updates_nested: load(&self.updates_nested),
            requests_answered: load(&self.requests_answered),
            responses_accepted: load(&self.responses_accepted),
            responses_discarded: load(&self.responses_discarded),
            self_echoes: load(&self.self_echoes),
            handler_errors: load(&self.handler_errors),
            broadcasts_sent: load(&self.broadcasts_sent),
            broadcasts_suppressed: load(&self.broadcasts_suppressed),
        }
    }
}
