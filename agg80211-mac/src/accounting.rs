#![forbid(unsafe_code)]

//! Per-destination frame counters of one category queue.
//!
//! Counters are in MSDUs: a unit counts one, an aggregate counts its entries
//! and a block counts every MSDU it carries. `free` is the part not yet
//! absorbed into a block, so `total - free` is what sits inside blocks.

use std::collections::HashMap;

use agg80211_core::MacAddress;

use crate::errors::{MacError, MacResult};
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCount {
    pub total: usize,
    pub free: usize,
}

impl PeerCount {
    pub fn blocked(&self) -> usize {
        self.total - self.free
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryAccounting {
    peers: HashMap<MacAddress, PeerCount>,
}

impl CategoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame entering the queue.
    pub fn admit(&mut self, frame: &Frame) {
        let leaves = frame.leaf_count();
        let count = self.peers.entry(frame.receiver()).or_default();
        count.total += leaves;
        if !matches!(frame, Frame::Block(_)) {
            count.free += leaves;
        }
    }

    /// Count a unit merged into an entry already queued.
    pub fn admit_merged(&mut self, peer: MacAddress) {
        let count = self.peers.entry(peer).or_default();
        count.total += 1;
        count.free += 1;
    }

    /// Uncount a frame leaving the queue.
    pub fn release(&mut self, frame: &Frame) -> MacResult<()> {
        let peer = frame.receiver();
        let leaves = frame.leaf_count();
        let free = if matches!(frame, Frame::Block(_)) { 0 } else { leaves };
        let count = self
            .peers
            .get_mut(&peer)
            .ok_or_else(|| MacError::Accounting(format!("no frames counted for {peer}")))?;
        if count.total < leaves || count.free < free {
            return Err(MacError::Accounting(format!(
                "releasing {leaves} frames ({free} free) for {peer} but only {} counted ({} free)",
                count.total, count.free
            )));
        }
        count.total -= leaves;
        count.free -= free;
        if count.total == 0 {
            self.peers.remove(&peer);
        }
        Ok(())
    }

    /// Move `n` free frames of `peer` into a block.
    pub fn block(&mut self, peer: MacAddress, n: usize) -> MacResult<()> {
        let count = self.peers.get_mut(&peer).filter(|c| c.free >= n).ok_or_else(|| {
            MacError::Accounting(format!("cannot block {n} frames for {peer}"))
        })?;
        count.free -= n;
        Ok(())
    }

    /// Return `n` blocked frames of `peer` to the free pool.
    pub fn unblock(&mut self, peer: MacAddress, n: usize) -> MacResult<()> {
        let count = self.peers.get_mut(&peer).filter(|c| c.blocked() >= n).ok_or_else(|| {
            MacError::Accounting(format!("cannot unblock {n} frames for {peer}"))
        })?;
        count.free += n;
        Ok(())
    }

    pub fn get(&self, peer: &MacAddress) -> PeerCount {
        self.peers.get(peer).copied().unwrap_or_default()
    }

    pub fn total(&self, peer: &MacAddress) -> usize {
        self.get(peer).total
    }

    pub fn free(&self, peer: &MacAddress) -> usize {
        self.get(peer).free
    }

    pub fn blocked(&self, peer: &MacAddress) -> usize {
        self.get(peer).blocked()
    }

    pub fn peers(&self) -> impl Iterator<Item = (&MacAddress, &PeerCount)> {
        self.peers.iter()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Counters rebuilt from scratch over `frames`.
    pub fn recount<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Self {
        let mut acc = Self::new();
        for f in frames {
            acc.admit(f);
        }
        acc
    }
}
