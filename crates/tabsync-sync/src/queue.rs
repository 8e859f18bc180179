//! Inbound queue.
//!
//! Strict FIFO with a single drain at a time: whoever enqueues into an idle
//! queue becomes the drainer and keeps popping until the queue is empty, so
//! arrivals during a drain are handled by that same drain. Everything that
//! patches the store goes through here, which keeps store mutation
//! single-file no matter how many runtime workers deliver messages.

use std::collections::VecDeque;

/// An item waiting to be handled, with its local arrival time.
#[derive(Debug, Clone)]
pub(crate) struct Queued<T> {
    pub item: T,
    /// Unix milliseconds at which this peer enqueued the item.
    pub received_at: i64,
}

#[derive(Debug)]
pub(crate) struct InboundQueue<T> {
    entries: VecDeque<Queued<T>>,
    draining: bool,
}

impl<T> InboundQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            draining: false,
        }
    }

    /// Append an item. Returns true when the caller must start draining.
    pub fn push(&mut self, item: T, received_at: i64) -> bool {
        self.entries.push_back(Queued { item, received_at });
        if self.draining {
            false
        } else {
            self.draining = true;
            true
        }
    }

    /// Pop the oldest item. Returning `None` ends the current drain.
    pub fn pop(&mut self) -> Option<Queued<T>> {
        let next = self.entries.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }

    /// Discard everything still waiting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
