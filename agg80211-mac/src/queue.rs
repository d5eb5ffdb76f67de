#![forbid(unsafe_code)]

//! Transmit queues: one management FIFO plus one data queue per access category.
//!
//! Admission order for a data unit:
//! 1. size check against the MSDU limit,
//! 2. classification,
//! 3. a pending channel request for the category short-circuits the queue,
//! 4. capacity check (overflow drops the unit and counts it),
//! 5. group-addressed units go behind the last queued group frame,
//! 6. unicast units go through the aggregation policy.

use std::collections::VecDeque;
use std::sync::Arc;

use agg80211_core::{AccessCategory, AggConfig, MacAddress, StatsSink};
use serde::Serialize;
use tracing::{debug, warn};

use crate::accounting::CategoryAccounting;
use crate::aggregation::{AggregationPolicy, Offer};
use crate::classifier::Classifier;
use crate::errors::{MacError, MacResult};
use crate::frame::{DataUnit, Frame};
use crate::management::MgmtFrame;

/// Data queue of one access category with its accounting.
#[derive(Debug, Clone)]
pub struct CategoryQueue {
    ac: AccessCategory,
    entries: VecDeque<Frame>,
    accounting: CategoryAccounting,
}

impl CategoryQueue {
    pub fn new(ac: AccessCategory) -> Self {
        Self { ac, entries: VecDeque::new(), accounting: CategoryAccounting::new() }
    }

    pub fn category(&self) -> AccessCategory {
        self.ac
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.entries.iter()
    }

    pub fn accounting(&self) -> &CategoryAccounting {
        &self.accounting
    }

    pub(crate) fn accounting_mut(&mut self) -> &mut CategoryAccounting {
        &mut self.accounting
    }

    /// Append and count.
    pub fn push_back(&mut self, frame: Frame) {
        self.accounting.admit(&frame);
        self.entries.push_back(frame);
    }

    /// Insert at `index` (clamped to the end) and count.
    pub fn insert(&mut self, index: usize, frame: Frame) {
        self.accounting.admit(&frame);
        let index = index.min(self.entries.len());
        self.entries.insert(index, frame);
    }

    pub fn pop_front(&mut self) -> MacResult<Option<Frame>> {
        self.remove(0)
    }

    /// Remove and uncount.
    pub fn remove(&mut self, index: usize) -> MacResult<Option<Frame>> {
        let Some(frame) = self.entries.get(index) else {
            return Ok(None);
        };
        self.accounting.release(frame)?;
        Ok(self.entries.remove(index))
    }

    /// Position right after the last queued group-addressed entry.
    pub fn group_insert_position(&self) -> usize {
        self.entries.iter().rposition(Frame::is_group_addressed).map_or(0, |i| i + 1)
    }

    /// MSDUs queued towards `peer`, inside blocks or not.
    pub fn queued_for(&self, peer: &MacAddress) -> usize {
        self.accounting.total(peer)
    }

    // Raw access for the aggregation policy and the block builder. These do
    // not touch accounting; callers adjust it themselves.

    pub(crate) fn get_mut_raw(&mut self, index: usize) -> Option<&mut Frame> {
        self.entries.get_mut(index)
    }

    pub(crate) fn take_raw(&mut self, index: usize) -> Option<Frame> {
        self.entries.remove(index)
    }

    pub(crate) fn insert_raw(&mut self, index: usize, frame: Frame) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, frame);
    }

    pub(crate) fn replace_raw(&mut self, index: usize, frame: Frame) -> Option<Frame> {
        let slot = self.entries.get_mut(index)?;
        Some(std::mem::replace(slot, frame))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.accounting.clear();
    }
}

/// Result of [`TransmitQueue::enqueue_data`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Queued as a standalone entry.
    Queued,
    /// Absorbed into an A-MSDU.
    Merged,
    /// A channel request was pending; transmit this frame right away.
    Direct(Frame),
    /// Category at capacity; the unit was discarded.
    Dropped,
}

/// Frame handed to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Management(MgmtFrame),
    Data { ac: AccessCategory, frame: Frame },
}

impl Outbound {
    pub fn receiver(&self) -> MacAddress {
        match self {
            Outbound::Management(m) => m.receiver,
            Outbound::Data { frame, .. } => frame.receiver(),
        }
    }
}

/// Monotonic queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounters {
    pub enqueued: [u64; AccessCategory::COUNT],
    pub dequeued: [u64; AccessCategory::COUNT],
    pub merged: [u64; AccessCategory::COUNT],
    pub dropped: [u64; AccessCategory::COUNT],
    pub direct: u64,
    pub mgmt_enqueued: u64,
    pub mgmt_dequeued: u64,
}

impl QueueCounters {
    pub fn total_dropped(&self) -> u64 {
        self.dropped.iter().sum()
    }
}

/// Point-in-time view of the queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub mgmt_len: usize,
    pub data_len: [usize; AccessCategory::COUNT],
    pub counters: QueueCounters,
}

pub struct TransmitQueue {
    mgmt: VecDeque<MgmtFrame>,
    categories: [CategoryQueue; AccessCategory::COUNT],
    classifier: Classifier,
    policy: AggregationPolicy,
    capacity: Option<usize>,
    max_msdu_len: u64,
    pending_requests: [u32; AccessCategory::COUNT],
    counters: QueueCounters,
    stats: Arc<dyn StatsSink>,
}

impl std::fmt::Debug for TransmitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitQueue")
            .field("mgmt", &self.mgmt.len())
            .field("data", &self.categories.iter().map(CategoryQueue::len).collect::<Vec<_>>())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl TransmitQueue {
    pub fn new(cfg: &AggConfig, stats: Arc<dyn StatsSink>) -> Self {
        let mut queue = Self {
            mgmt: VecDeque::new(),
            categories: AccessCategory::ALL.map(CategoryQueue::new),
            classifier: Classifier::default(),
            policy: AggregationPolicy::from_config(&cfg.aggregation),
            capacity: None,
            max_msdu_len: 0,
            pending_requests: [0; AccessCategory::COUNT],
            counters: QueueCounters::default(),
            stats,
        };
        queue.apply_config(cfg);
        queue
    }

    /// Take over queue and aggregation settings. Queued frames are kept.
    pub fn apply_config(&mut self, cfg: &AggConfig) {
        self.classifier = Classifier::new(cfg.queue.edca);
        self.policy = AggregationPolicy::from_config(&cfg.aggregation);
        self.capacity = (cfg.queue.frame_capacity > 0).then_some(cfg.queue.frame_capacity);
        self.max_msdu_len = cfg.queue.max_msdu_len;
    }

    pub fn policy(&self) -> &AggregationPolicy {
        &self.policy
    }

    /// Management frames bypass classification and aggregation.
    pub fn enqueue_mgmt(&mut self, frame: MgmtFrame) {
        self.counters.mgmt_enqueued += 1;
        self.mgmt.push_back(frame);
    }

    pub fn enqueue_data(&mut self, unit: DataUnit) -> MacResult<Admission> {
        let payload = unit.payload_len();
        if payload > self.max_msdu_len {
            return Err(MacError::FrameTooLong { len: payload, max: self.max_msdu_len });
        }

        let ac = self.classifier.classify(&unit);
        let idx = ac.index();

        if self.pending_requests[idx] > 0 {
            self.pending_requests[idx] -= 1;
            self.counters.direct += 1;
            debug!(ac = ac.name(), "pending channel request served directly");
            return Ok(Admission::Direct(Frame::Unit(unit)));
        }

        if self.capacity.is_some_and(|cap| self.categories[idx].len() >= cap) {
            self.counters.dropped[idx] += 1;
            self.stats.frame_dropped(ac);
            warn!(ac = ac.name(), receiver = %unit.receiver(), "queue full, data unit dropped");
            return Ok(Admission::Dropped);
        }

        let queue = &mut self.categories[idx];
        let admission = if unit.header().is_group_addressed() {
            let at = queue.group_insert_position();
            queue.insert(at, Frame::Unit(unit));
            Admission::Queued
        } else {
            match self.policy.offer(unit, queue)? {
                Offer::Merged | Offer::Created { .. } => {
                    self.counters.merged[idx] += 1;
                    self.stats.aggregate_merged(ac);
                    Admission::Merged
                }
                Offer::Standalone(unit) => {
                    queue.push_back(Frame::Unit(unit));
                    Admission::Queued
                }
            }
        };

        self.counters.enqueued[idx] += 1;
        self.stats.frame_enqueued(ac);
        self.stats.data_queue_len(self.data_len());
        Ok(admission)
    }

    /// Next frame for the channel: management first, then data by strict priority.
    pub fn dequeue(&mut self) -> MacResult<Option<Outbound>> {
        if let Some(frame) = self.mgmt.pop_front() {
            self.counters.mgmt_dequeued += 1;
            return Ok(Some(Outbound::Management(frame)));
        }
        for ac in AccessCategory::BY_PRIORITY {
            if let Some(out) = self.dequeue_category(ac)? {
                return Ok(Some(out));
            }
        }
        Ok(None)
    }

    /// Head of one category's data queue.
    pub fn dequeue_category(&mut self, ac: AccessCategory) -> MacResult<Option<Outbound>> {
        let Some(frame) = self.categories[ac.index()].pop_front()? else {
            return Ok(None);
        };
        self.counters.dequeued[ac.index()] += 1;
        self.stats.frame_dequeued(ac);
        self.stats.data_queue_len(self.data_len());
        Ok(Some(Outbound::Data { ac, frame }))
    }

    /// Channel access granted for `ac`. With nothing queued the request is
    /// remembered and the next unit of that category bypasses the queue.
    pub fn request_frame(&mut self, ac: AccessCategory) -> MacResult<Option<Outbound>> {
        if let Some(frame) = self.mgmt.pop_front() {
            self.counters.mgmt_dequeued += 1;
            return Ok(Some(Outbound::Management(frame)));
        }
        let out = self.dequeue_category(ac)?;
        if out.is_none() {
            self.pending_requests[ac.index()] += 1;
        }
        Ok(out)
    }

    pub fn pending_requests(&self, ac: AccessCategory) -> u32 {
        self.pending_requests[ac.index()]
    }

    pub fn category(&self, ac: AccessCategory) -> &CategoryQueue {
        &self.categories[ac.index()]
    }

    pub(crate) fn category_mut(&mut self, ac: AccessCategory) -> &mut CategoryQueue {
        &mut self.categories[ac.index()]
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryQueue> {
        self.categories.iter()
    }

    pub fn mgmt_len(&self) -> usize {
        self.mgmt.len()
    }

    pub fn mgmt_frames(&self) -> impl Iterator<Item = &MgmtFrame> {
        self.mgmt.iter()
    }

    /// Entries across all data queues.
    pub fn data_len(&self) -> usize {
        self.categories.iter().map(CategoryQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.mgmt.is_empty() && self.data_len() == 0
    }

    /// MSDUs queued towards `peer` in any category.
    pub fn queued_for(&self, peer: &MacAddress) -> usize {
        self.categories.iter().map(|q| q.queued_for(peer)).sum()
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.counters
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            mgmt_len: self.mgmt.len(),
            data_len: self.categories.each_ref().map(CategoryQueue::len),
            counters: self.counters.clone(),
        }
    }

    /// Drop every queued frame and pending request. Counters are kept.
    pub fn clear(&mut self) {
        self.mgmt.clear();
        for q in &mut self.categories {
            q.clear();
        }
        self.pending_requests = [0; AccessCategory::COUNT];
        self.stats.data_queue_len(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DataHeader;
    use agg80211_core::NoopStats;

    fn config(capacity: usize, aggregation: bool) -> AggConfig {
        let mut cfg = AggConfig::default();
        cfg.queue.frame_capacity = capacity;
        cfg.aggregation.enabled = aggregation;
        cfg
    }

    fn queue(capacity: usize, aggregation: bool) -> TransmitQueue {
        TransmitQueue::new(&config(capacity, aggregation), Arc::new(NoopStats))
    }

    fn unit(peer: MacAddress, tid: u8) -> DataUnit {
        DataUnit::zeroed(DataHeader::new(peer, MacAddress::local(0)).with_tid(tid), 100)
    }

    #[test]
    fn overflow_drops_and_counts() {
        let mut q = queue(2, false);
        let peer = MacAddress::local(1);
        assert_eq!(q.enqueue_data(unit(peer, 0)).unwrap(), Admission::Queued);
        assert_eq!(q.enqueue_data(unit(peer, 0)).unwrap(), Admission::Queued);
        assert_eq!(q.enqueue_data(unit(peer, 0)).unwrap(), Admission::Dropped);
        assert_eq!(q.category(AccessCategory::BestEffort).len(), 2);
        assert_eq!(q.counters().dropped[AccessCategory::BestEffort.index()], 1);
        // other categories are bounded separately
        assert_eq!(q.enqueue_data(unit(peer, 6)).unwrap(), Admission::Queued);
    }

    #[test]
    fn oversized_unit_is_rejected() {
        let mut q = queue(0, true);
        let header = DataHeader::new(MacAddress::local(1), MacAddress::local(0));
        let big = DataUnit::zeroed(header, 3000);
        assert!(matches!(
            q.enqueue_data(big),
            Err(MacError::FrameTooLong { len: 3000, max: 2312 })
        ));
        assert_eq!(q.data_len(), 0);
    }

    #[test]
    fn group_frames_stay_ahead_of_unicast() {
        let mut q = queue(0, false);
        q.enqueue_data(unit(MacAddress::local(1), 0)).unwrap();
        q.enqueue_data(unit(MacAddress::BROADCAST, 0)).unwrap();
        q.enqueue_data(unit(MacAddress::local(1), 0)).unwrap();
        q.enqueue_data(unit(MacAddress::BROADCAST, 0)).unwrap();
        let order: Vec<bool> =
            q.category(AccessCategory::BestEffort).iter().map(Frame::is_group_addressed).collect();
        assert_eq!(order, vec![true, true, false, false]);
    }

    #[test]
    fn management_and_priority_order() {
        let mut q = queue(0, false);
        q.enqueue_data(unit(MacAddress::local(1), 1)).unwrap();
        q.enqueue_data(unit(MacAddress::local(1), 5)).unwrap();
        q.enqueue_data(unit(MacAddress::local(1), 7)).unwrap();
        q.enqueue_mgmt(MgmtFrame::delba(MacAddress::local(1), MacAddress::local(0), true, 0, 37));
        assert!(matches!(q.dequeue().unwrap(), Some(Outbound::Management(_))));
        let order: Vec<AccessCategory> = std::iter::from_fn(|| q.dequeue().unwrap())
            .map(|o| match o {
                Outbound::Data { ac, .. } => ac,
                Outbound::Management(_) => panic!("unexpected management frame"),
            })
            .collect();
        assert_eq!(
            order,
            vec![AccessCategory::Voice, AccessCategory::Video, AccessCategory::Background]
        );
    }

    #[test]
    fn pending_request_is_served_directly() {
        let mut q = queue(0, true);
        assert!(q.request_frame(AccessCategory::BestEffort).unwrap().is_none());
        assert_eq!(q.pending_requests(AccessCategory::BestEffort), 1);
        let admission = q.enqueue_data(unit(MacAddress::local(1), 0)).unwrap();
        assert!(matches!(admission, Admission::Direct(_)));

        assert_eq!(q.data_len(), 0);
        assert_eq!(q.enqueue_data(unit(MacAddress::local(1), 0)).unwrap(), Admission::Queued);
    }

    #[test]
    fn clear_empties_everything() {
        let mut q = queue(0, true);
        for _ in 0..4 {
            q.enqueue_data(unit(MacAddress::local(1), 0)).unwrap();
        }
        q.request_frame(AccessCategory::Voice).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.queued_for(&MacAddress::local(1)), 0);
        assert_eq!(q.pending_requests(AccessCategory::Voice), 0);
    }
}
