#![forbid(unsafe_code)]

//! Statistics sink consumed by the queueing engine.
//!
//! Every method is fire-and-forget and defaults to a no-op so sinks only
//! override what they export.

use crate::{AccessCategory, MacAddress};

pub trait StatsSink: Send + Sync {
    /// Total number of queued data entries across all categories.
    fn data_queue_len(&self, _len: usize) {}

    fn frame_enqueued(&self, _ac: AccessCategory) {}

    fn frame_dequeued(&self, _ac: AccessCategory) {}

    /// Data frame rejected at admission because the category was full.
    fn frame_dropped(&self, _ac: AccessCategory) {}

    /// Management frame with an unrecognised or malformed body.
    fn mgmt_frame_dropped(&self) {}

    /// Unicast unit absorbed into an A-MSDU instead of taking its own queue slot.
    fn aggregate_merged(&self, _ac: AccessCategory) {}

    fn block_built(&self, _ac: AccessCategory, _entries: usize) {}

    fn session_state(&self, _peer: &MacAddress, _state: &'static str) {}
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {}
