//! Per-receiver 802.11 sequence number generator.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use agg80211_core::MacAddress;

use crate::frame::SEQ_MODULO;

#[derive(Debug, Default)]
pub struct Sequencer {
    counters: HashMap<MacAddress, u16>,
}

impl Sequencer {
    pub fn new() -> Self { Self { counters: HashMap::new() } }

    /// Obtain next 12-bit sequence number towards `receiver`.
    pub fn next(&mut self, receiver: MacAddress) -> u16 {
        let counter = self.counters.entry(receiver).or_insert(0);
        let seq = *counter;
        *counter = (*counter + 1) % SEQ_MODULO;
        seq
    }

    /// Sequence number the next frame towards `receiver` will carry.
    pub fn peek(&self, receiver: &MacAddress) -> u16 {
        self.counters.get(receiver).copied().unwrap_or(0)
    }
}
