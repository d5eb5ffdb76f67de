#![forbid(unsafe_code)]

//! Shared fixtures for the conformance suite: addresses, unit builders,
//! proptest strategies and the accounting cross-check.

use std::collections::HashSet;

use agg80211_core::{AggConfig, MacAddress};
use agg80211_mac::{CategoryAccounting, CategoryQueue, DataHeader, DataUnit, Frame};
use proptest::prelude::*;

/// Address every fixture transmits from.
pub const OWN: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);

pub fn peer(n: u32) -> MacAddress {
    MacAddress::local(n + 16)
}

pub fn unit(to: MacAddress, len: usize) -> DataUnit {
    DataUnit::zeroed(DataHeader::new(to, OWN), len)
}

pub fn broadcast(len: usize) -> DataUnit {
    unit(MacAddress::BROADCAST, len)
}

/// Default configuration with block ack open to every peer.
pub fn open_config() -> AggConfig {
    let mut cfg = AggConfig::default();
    cfg.block_ack.allow_all = true;
    cfg
}

/// One data unit of generated traffic.
#[derive(Debug, Clone)]
pub struct Traffic {
    /// `None` is a broadcast.
    pub peer: Option<u32>,
    pub len: usize,
}

impl Traffic {
    pub fn to_unit(&self) -> DataUnit {
        match self.peer {
            Some(n) => unit(peer(n), self.len),
            None => broadcast(self.len),
        }
    }
}

/// Unicast to one of `peers` destinations, with roughly one broadcast in eight.
pub fn traffic(peers: u32) -> impl Strategy<Value = Traffic> {
    (prop::option::weighted(0.875, 0..peers), 1usize..1500)
        .prop_map(|(peer, len)| Traffic { peer, len })
}

pub fn payload_lens(max_count: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..1500, 1..max_count)
}

/// Compare the live counters of `queue` with a recount over its frames.
pub fn check_accounting(queue: &CategoryQueue) -> Result<(), String> {
    let expected = CategoryAccounting::recount(queue.iter());
    let live = queue.accounting();
    let peers: HashSet<MacAddress> =
        expected.peers().map(|(p, _)| *p).chain(live.peers().map(|(p, _)| *p)).collect();
    for p in peers {
        if live.get(&p) != expected.get(&p) {
            return Err(format!(
                "peer {p}: live {:?}, recounted {:?}",
                live.get(&p),
                expected.get(&p)
            ));

        }
    }
    Ok(())
}

/// MSDUs reachable from `queue` after expanding every aggregate and block.
pub fn leaves(queue: &CategoryQueue) -> usize {
    queue.iter().map(Frame::leaf_count).sum()
}
