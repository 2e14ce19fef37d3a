//! Single-slot handoff between the frame loop and the display.
//!
//! Posting overwrites whatever has not been collected yet, so a slow display
//! only ever sees the newest frame and memory stays bounded at one item.
//! `clear` is also a signal: a waiting consumer is told the producer's
//! session ended, so it can blank whatever it last displayed.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct Slot<T> {
    value: Option<T>,
    posted: u64,
    clears: u64,
    closed: bool,
}

/// What a waiting consumer receives.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery<T> {
    Value(T),
    /// `clear` ran since the consumer last looked.
    Cleared,
    /// Timed out, or the mailbox was closed.
    Empty,
}

pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                posted: 0,
                clears: 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    // A panicking poster cannot leave the slot half-written, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the pending value. Never blocks on the consumer.
    pub fn post(&self, value: T) {
        let mut slot = self.lock();
        slot.value = Some(value);
        slot.posted += 1;
        drop(slot);
        self.ready.notify_one();
    }

    /// Collect the pending value, if any.
    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Wait up to `timeout` for a value or a clear.
    ///
    /// `seen_clears` is the consumer's count of clears already handled; it is
    /// advanced when `Cleared` is returned. A clear is reported before any
    /// value posted after it.
    pub fn recv_timeout(&self, timeout: Duration, seen_clears: &mut u64) -> Delivery<T> {
        let seen = *seen_clears;
        let slot = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| {
                slot.value.is_none() && !slot.closed && slot.clears == seen
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.clears != seen {
            *seen_clears = slot.clears;
            return Delivery::Cleared;
        }
        match slot.value.take() {
            Some(value) => Delivery::Value(value),
            None => Delivery::Empty,
        }
    }

    /// Drop the pending value and signal the consumer that the session ended.
    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.value = None;
        slot.clears += 1;
        drop(slot);
        self.ready.notify_all();
    }

    /// Number of clears so far; a consumer's starting point for `recv_timeout`.
    pub fn clears(&self) -> u64 {
        self.lock().clears
    }

    /// Wake any waiting consumer for good.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total number of posts, delivered or overwritten.
    pub fn posted(&self) -> u64 {
        self.lock().posted
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
