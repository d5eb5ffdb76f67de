#![forbid(unsafe_code)]

//! Block-ack timers keyed by (peer, kind).
//!
//! Time is logical: callers pass the current instant as a [`SimTime`] offset
//! and the queue hands back expired keys in deadline order. At most one timer
//! per key is armed; re-arming replaces the previous deadline.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use agg80211_core::MacAddress;

/// Offset from the start of the run.
pub type SimTime = Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// No ADDBA response arrived in time.
    AddbaFailure,
    /// Originator-side session lifetime.
    BlockTimeout,
    /// Recipient-side acceptance lifetime.
    ResetBlock,
}

impl TimerKind {
    pub fn name(self) -> &'static str {
        match self {
            TimerKind::AddbaFailure => "ADDBA_FAILURE",
            TimerKind::BlockTimeout => "BLOCK_TIMEOUT",
            TimerKind::ResetBlock => "RESET_BLOCK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub peer: MacAddress,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(peer: MacAddress, kind: TimerKind) -> Self {
        Self { peer, kind }
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    // (deadline, arm order) keeps same-instant timers in FIFO order
    schedule: BTreeMap<(SimTime, u64), TimerKey>,
    armed: HashMap<TimerKey, (SimTime, u64)>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `key` to fire at `at`. Returns the deadline it replaced, if any.
    pub fn arm(&mut self, key: TimerKey, at: SimTime) -> Option<SimTime> {
        let previous = self.cancel(key);
        let slot = (at, self.next_seq);
        self.next_seq += 1;
        self.schedule.insert(slot, key);
        self.armed.insert(key, slot);
        previous
    }

    pub fn cancel(&mut self, key: TimerKey) -> Option<SimTime> {
        let slot = self.armed.remove(&key)?;
        self.schedule.remove(&slot);
        Some(slot.0)
    }

    /// Drop every timer of `peer`.
    pub fn cancel_peer(&mut self, peer: MacAddress) {
        for kind in [TimerKind::AddbaFailure, TimerKind::BlockTimeout, TimerKind::ResetBlock] {
            self.cancel(TimerKey::new(peer, kind));
        }
    }

    pub fn deadline(&self, key: TimerKey) -> Option<SimTime> {
        self.armed.get(&key).map(|slot| slot.0)
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn next_deadline(&self) -> Option<SimTime> {
        self.schedule.keys().next().map(|slot| slot.0)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<(SimTime, TimerKey)> {
        let (&slot, _) = self.schedule.iter().next().filter(|(slot, _)| slot.0 <= now)?;
        let key = self.schedule.remove(&slot)?;
        self.armed.remove(&key);
        Some((slot.0, key))
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn clear(&mut self) {
        self.schedule.clear();
        self.armed.clear();
    }
}
