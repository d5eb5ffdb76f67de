#![forbid(unsafe_code)]

//! A-MSDU aggregation policy.
//!
//! Decides, for a unicast unit about to be queued, whether it joins an
//! aggregate already waiting for the same receiver, builds a new aggregate
//! out of compatible queued units, or is queued on its own.

use std::collections::HashSet;

use agg80211_core::AggregationConfig;
use tracing::trace;

use crate::errors::MacResult;
use crate::frame::{DataUnit, Frame, FrameId};
use crate::msdu::AggregateContainer;
use crate::queue::CategoryQueue;

/// Outcome of [`AggregationPolicy::offer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Offer {
    /// Unit appended to a queued aggregate.
    Merged,
    /// A new aggregate replaced `absorbed` queued units and took the offered unit as last entry.
    Created { absorbed: usize },
    /// Not aggregated; the caller queues the unit as is.
    Standalone(DataUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationPolicy {
    enabled: bool,
    max_len: u64,
}

impl AggregationPolicy {
    pub fn new(enabled: bool, max_len: u64) -> Self {
        Self { enabled, max_len }
    }

    pub fn from_config(cfg: &AggregationConfig) -> Self {
        Self::new(cfg.enabled, cfg.max_aggregate_len)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    fn eligible(&self, unit: &DataUnit) -> bool {
        let h = unit.header();
        self.enabled && unit.is_plain_data() && !h.is_group_addressed() && !h.is_in_transit()
    }

    /// Try to place `unit` into an aggregate of `queue`.
    ///
    /// Accounting of `queue` is updated for whatever the policy absorbs.
    pub fn offer(&self, unit: DataUnit, queue: &mut CategoryQueue) -> MacResult<Offer> {
        if !self.eligible(&unit) {
            return Ok(Offer::Standalone(unit));
        }

        let candidates: Vec<usize> = queue
            .iter()
            .enumerate()
            .filter(|(_, f)| f.header().is_some_and(|h| h.same_flow(unit.header())))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return Ok(Offer::Standalone(unit));
        }

        // Join the first queued aggregate of the same kind with room left.
        let subtype = unit.header().mesh_subtype();
        for &idx in &candidates {
            if let Some(Frame::Aggregate(c)) = queue.get_mut_raw(idx) {
                if c.mesh_subtype() == subtype && c.byte_len() + unit.byte_len() < self.max_len {
                    let receiver = unit.receiver();
                    c.push_back(unit)?;
                    let entries = c.count();
                    queue.accounting_mut().admit_merged(receiver);
                    trace!(%receiver, entries, "unit merged into queued aggregate");
                    return Ok(Offer::Merged);
                }
            }
        }

        // Otherwise gather plain units of the same kind.
        let mergeable: HashSet<FrameId> = candidates
            .iter()
            .filter_map(|&idx| match queue.get(idx) {
                Some(Frame::Unit(u))
                    if u.is_plain_data() && u.header().mesh_subtype() == subtype =>
                {
                    Some(u.id())
                }
                _ => None,
            })
            .collect();
        if mergeable.is_empty() {
            return Ok(Offer::Standalone(unit));
        }

        let mut container = AggregateContainer::new(unit.header().clone());
        let mut insert_at = None;
        let mut idx = 0;
        while idx < queue.len() {
            // checked before removal: a frame only leaves the queue into the container
            let absorb = queue.get(idx).is_some_and(|f| {
                let id = f.id();
                mergeable.contains(&id) && id != unit.id() && !container.contains(id)
            });
            if !absorb {
                idx += 1;
                continue;
            }
            match queue.take_raw(idx) {
                Some(Frame::Unit(u)) => {
                    insert_at.get_or_insert(idx);
                    container.push_back(u)?;
                }
                Some(other) => {
                    queue.insert_raw(idx, other);
                    idx += 1;
                }
                None => break,
            }
        }
        let Some(at) = insert_at else {
            return Ok(Offer::Standalone(unit));
        };
        let absorbed = container.count();
        let receiver = unit.receiver();
        container.push_back(unit)?;
        queue.insert_raw(at, Frame::Aggregate(container));
        queue.accounting_mut().admit_merged(receiver);
        trace!(%receiver, absorbed, "new aggregate built from queued units");
        Ok(Offer::Created { absorbed })
    }
}
