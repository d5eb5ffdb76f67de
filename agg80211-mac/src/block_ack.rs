#![forbid(unsafe_code)]

//! Block-ack session management.
//!
//! One [`AddbaRecord`] per peer tracks the originator-side state machine:
//!
//! ```text
//! DEFAULT --(free frames >= threshold / ADDBA request)--> WAIT_CONFIRMATION
//! WAIT_CONFIRMATION --(ADDBA response)--> SENDBLOCK
//! WAIT_CONFIRMATION --(ADDBA_FAILURE)--> DEFAULT
//! SENDBLOCK --(queue drained / DELBA)--> DEFAULT
//! SENDBLOCK --(BLOCK_TIMEOUT / DELBA)--> DEFAULT
//! ```
//!
//! `WAITBLOCK` exists in the state enum but no transition leads to it.
//! The recipient side only remembers whether a peer's request was accepted;
//! acceptance lapses when RESET_BLOCK fires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use agg80211_core::{AccessCategory, BlockAckConfig, MacAddress, StatsSink};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::BlockBuilder;
use crate::errors::{MacError, MacResult};
use crate::frame::Frame;
use crate::management::{
    ActionBody, AddbaRequest, AddbaResponse, BaParameterSet, Delba, MgmtFrame, REASON_END_BA,
    REASON_TIMEOUT, STATUS_REQUEST_DECLINED, STATUS_SUCCESS,
};
use crate::queue::TransmitQueue;
use crate::timer::{SimTime, TimerKey, TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Default,
    WaitConfirmation,
    WaitBlock,
    SendBlock,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Default => "DEFAULT",
            SessionState::WaitConfirmation => "WAIT_CONFIRMATION",
            SessionState::WaitBlock => "WAITBLOCK",
            SessionState::SendBlock => "SENDBLOCK",
        }
    }
}

/// Hook informed when a peer's block-ack agreement is accepted or dropped on
/// the recipient side.
pub trait PeerFilter: Send {
    fn accept(&mut self, _peer: MacAddress) {}
    fn discard(&mut self, _peer: MacAddress) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl PeerFilter for NoFilter {}

/// Per-peer negotiation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddbaRecord {
    pub state: SessionState,
    /// An ADDBA request is in flight.
    pub pending: bool,
    pub dialog_token: u8,
    pub category: AccessCategory,
    pub tid: u8,
    pub buffer_size: u16,
    pub starting_seq: u16,
    /// Octets sent in the current session.
    pub bytes_sent: u64,
    pub session_start: Option<SimTime>,
    /// Recipient side: the peer's request was accepted and has not lapsed.
    pub accepted: bool,
    pub sessions_opened: u64,
    pub failures: u64,
    pub timeouts: u64,
}

impl AddbaRecord {
    fn new(category: AccessCategory) -> Self {
        Self {
            state: SessionState::Default,
            pending: false,
            dialog_token: 0,
            category,
            tid: category.tid(),
            buffer_size: 0,
            starting_seq: 0,
            bytes_sent: 0,
            session_start: None,
            accepted: false,
            sessions_opened: 0,
            failures: 0,
            timeouts: 0,
        }
    }
}

fn transition(stats: &dyn StatsSink, peer: MacAddress, rec: &mut AddbaRecord, to: SessionState) {
    if rec.state != to {
        debug!(%peer, from = rec.state.name(), to = to.name(), "block-ack session transition");
        rec.state = to;
        stats.session_state(&peer, to.name());
    }
}

/// Time units (1024 µs) for ADDBA timeout fields.
fn to_tu(d: Duration) -> u16 {
    (d.as_micros() / 1024).min(u16::MAX as u128) as u16
}

pub struct BlockAckManager {
    own: MacAddress,
    enabled: bool,
    allow_all: bool,
    allowed: HashSet<MacAddress>,
    records: HashMap<MacAddress, AddbaRecord>,
    timers: TimerQueue,
    builder: BlockBuilder,
    auto_threshold: usize,
    block_ack_timeout: Duration,
    addba_failure_timeout: Duration,
    reset_block_timeout: Duration,
    buffer_size: u16,
    reset_after_send: bool,
    next_token: u8,
    filter: Box<dyn PeerFilter>,
    stats: Arc<dyn StatsSink>,
}

impl std::fmt::Debug for BlockAckManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAckManager")
            .field("own", &self.own)
            .field("enabled", &self.enabled)
            .field("records", &self.records)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl BlockAckManager {
    pub fn new(
        own: MacAddress,
        cfg: &BlockAckConfig,
        stats: Arc<dyn StatsSink>,
    ) -> MacResult<Self> {
        let mut manager = Self {
            own,
            enabled: cfg.enabled,
            allow_all: cfg.allow_all,
            allowed: HashSet::new(),
            records: HashMap::new(),
            timers: TimerQueue::new(),
            builder: BlockBuilder::from_config(cfg),
            auto_threshold: cfg.auto_threshold,
            block_ack_timeout: Duration::ZERO,
            addba_failure_timeout: Duration::ZERO,
            reset_block_timeout: Duration::ZERO,
            buffer_size: cfg.buffer_size,
            reset_after_send: cfg.reset_after_send,
            next_token: 1,
            filter: Box::new(NoFilter),
            stats,
        };
        manager.apply_config(cfg)?;
        Ok(manager)
    }

    pub fn with_filter(mut self, filter: Box<dyn PeerFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Take over new parameters. Peers are only ever added to the allow list
    /// here; removal goes through [`disallow`](Self::disallow).
    pub fn apply_config(&mut self, cfg: &BlockAckConfig) -> MacResult<()> {
        let peers = cfg.allowed_peers()?;
        self.enabled = cfg.enabled;
        self.allow_all = cfg.allow_all;
        self.allowed.extend(peers);
        self.builder = BlockBuilder::from_config(cfg);
        self.auto_threshold = cfg.auto_threshold;
        self.block_ack_timeout = Duration::from_millis(cfg.block_ack_timeout_ms);
        self.addba_failure_timeout = Duration::from_millis(cfg.addba_failure_timeout_ms);
        self.reset_block_timeout = Duration::from_millis(cfg.reset_block_timeout_ms);
        self.buffer_size = cfg.buffer_size;
        self.reset_after_send = cfg.reset_after_send;
        Ok(())
    }

    pub fn builder(&self) -> &BlockBuilder {
        &self.builder
    }

    pub fn allow(&mut self, peer: MacAddress) {
        self.allowed.insert(peer);
    }

    pub fn set_allow_all(&mut self, allow_all: bool) {
        self.allow_all = allow_all;
    }

    /// Remove `peer` from the allow list, dropping its record, timers and blocks.
    pub fn disallow(&mut self, peer: MacAddress, queue: &mut TransmitQueue) -> MacResult<()> {
        self.allowed.remove(&peer);
        self.timers.cancel_peer(peer);
        if self.records.remove(&peer).is_some() {
            self.release_blocks(peer, queue)?;
            self.stats.session_state(&peer, SessionState::Default.name());
        }
        Ok(())
    }

    pub fn allowed_peers(&self) -> impl Iterator<Item = &MacAddress> {
        self.allowed.iter()
    }

    pub fn is_allowed(&self, peer: &MacAddress) -> bool {
        self.allow_all || self.allowed.contains(peer)
    }

    pub fn state(&self, peer: &MacAddress) -> SessionState {
        self.records.get(peer).map_or(SessionState::Default, |r| r.state)
    }

    pub fn record(&self, peer: &MacAddress) -> Option<&AddbaRecord> {
        self.records.get(peer)
    }

    pub fn records(&self) -> impl Iterator<Item = (&MacAddress, &AddbaRecord)> {
        self.records.iter()
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<SimTime> {
        self.timers.next_deadline()
    }

    fn next_token(&mut self) -> u8 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1).max(1);
        token
    }

    /// Start a negotiation with `peer` once enough free frames wait for it.
    /// Returns whether an ADDBA request was queued.
    pub fn maybe_negotiate(
        &mut self,
        peer: MacAddress,
        queue: &mut TransmitQueue,
        now: SimTime,
    ) -> MacResult<bool> {
        if !self.enabled || !peer.is_unicast() || !self.is_allowed(&peer) {
            return Ok(false);
        }
        if self.state(&peer) != SessionState::Default {
            return Ok(false);
        }
        let threshold = self.auto_threshold;
        let Some(ac) = AccessCategory::BY_PRIORITY
            .into_iter()
            .find(|ac| queue.category(*ac).accounting().free(&peer) >= threshold)
        else {
            return Ok(false);
        };

        let starting_seq = queue
            .category(ac)
            .iter()
            .find(|f| f.receiver() == peer && !matches!(f, Frame::Block(_)))
            .and_then(|f| f.header().map(|h| h.sequence))
            .unwrap_or(0);
        let token = self.next_token();
        let rec = self.records.entry(peer).or_insert_with(|| AddbaRecord::new(ac));
        rec.category = ac;
        rec.tid = ac.tid();
        rec.dialog_token = token;
        rec.buffer_size = self.buffer_size;
        rec.starting_seq = starting_seq;
        rec.pending = true;
        transition(&*self.stats, peer, rec, SessionState::WaitConfirmation);

        let request = AddbaRequest {
            dialog_token: token,
            params: BaParameterSet {
                amsdu_supported: true,
                immediate_policy: true,
                tid: ac.tid(),
                buffer_size: self.buffer_size,
            },
            timeout_tu: to_tu(self.block_ack_timeout),
            starting_seq,
        };
        queue.enqueue_mgmt(MgmtFrame::new(peer, self.own, ActionBody::AddbaRequest(request)));
        self.timers.arm(
            TimerKey::new(peer, TimerKind::AddbaFailure),
            now + self.addba_failure_timeout,
        );
        info!(%peer, ac = ac.name(), token, "ADDBA request queued");
        Ok(true)
    }

    /// Consume a received block-ack action frame. Returns `false` for frames
    /// that are not block-ack actions.
    pub fn handle_action(
        &mut self,
        frame: &MgmtFrame,
        queue: &mut TransmitQueue,
        now: SimTime,
    ) -> MacResult<bool> {
        let peer = frame.transmitter;
        match &frame.body {
            ActionBody::AddbaRequest(req) => {
                self.respond(peer, req, queue, now);
                Ok(true)
            }
            ActionBody::AddbaResponse(resp) => {
                self.confirm(peer, resp, queue, now)?;
                Ok(true)
            }
            ActionBody::Delba(d) => {
                self.discard(peer, d);
                Ok(true)
            }
            ActionBody::Unknown { .. } => Ok(false),
        }
    }

    fn respond(
        &mut self,
        peer: MacAddress,
        req: &AddbaRequest,
        queue: &mut TransmitQueue,
        now: SimTime,
    ) {
        let status = if self.enabled { STATUS_SUCCESS } else { STATUS_REQUEST_DECLINED };
        let params = BaParameterSet {
            buffer_size: req.params.buffer_size.min(self.buffer_size),
            ..req.params
        };
        let response = AddbaResponse {
            dialog_token: req.dialog_token,
            status,
            params,
            timeout_tu: req.timeout_tu,
        };
        queue.enqueue_mgmt(MgmtFrame::new(peer, self.own, ActionBody::AddbaResponse(response)));

        if status != STATUS_SUCCESS {
            debug!(%peer, "ADDBA request declined, block ack disabled");
            return;
        }
        let ac = AccessCategory::from_user_priority(req.params.tid);
        let rec = self.records.entry(peer).or_insert_with(|| AddbaRecord::new(ac));
        rec.accepted = true;
        self.filter.accept(peer);
        self.timers.arm(TimerKey::new(peer, TimerKind::ResetBlock), now + self.reset_block_timeout);
        debug!(%peer, tid = req.params.tid, token = req.dialog_token, "ADDBA request accepted");
    }

    fn confirm(
        &mut self,
        peer: MacAddress,
        resp: &AddbaResponse,
        queue: &mut TransmitQueue,
        now: SimTime,
    ) -> MacResult<()> {
        let Some(rec) = self.records.get_mut(&peer).filter(|r| {
            r.pending
                && r.state == SessionState::WaitConfirmation
                && r.dialog_token == resp.dialog_token
        }) else {
            return Err(MacError::NoPendingSession { peer });
        };
        self.timers.cancel(TimerKey::new(peer, TimerKind::AddbaFailure));
        rec.pending = false;

        if resp.status != STATUS_SUCCESS {
            rec.failures += 1;
            transition(&*self.stats, peer, rec, SessionState::Default);
            warn!(%peer, status = resp.status, "ADDBA request refused by peer");
            return Ok(());
        }

        rec.bytes_sent = 0;
        rec.session_start = Some(now);
        rec.sessions_opened += 1;
        rec.buffer_size = resp.params.buffer_size;
        transition(&*self.stats, peer, rec, SessionState::SendBlock);
        self.timers.arm(TimerKey::new(peer, TimerKind::BlockTimeout), now + self.block_ack_timeout);
        info!(%peer, token = resp.dialog_token, "block-ack session established");
        self.check_state(peer, queue)
    }

    fn discard(&mut self, peer: MacAddress, delba: &Delba) {
        if let Some(rec) = self.records.get_mut(&peer) {
            rec.accepted = false;
        }
        self.timers.cancel(TimerKey::new(peer, TimerKind::ResetBlock));
        self.filter.discard(peer);
        debug!(%peer, tid = delba.tid, reason = delba.reason, "DELBA received");
    }

    /// Fire every timer due at `now`. Returns the keys that fired, in order.
    pub fn fire_due(
        &mut self,
        queue: &mut TransmitQueue,
        now: SimTime,
    ) -> MacResult<Vec<TimerKey>> {
        let mut fired = Vec::new();
        while let Some((_, key)) = self.timers.pop_due(now) {
            fired.push(key);
            let peer = key.peer;
            match key.kind {
                TimerKind::AddbaFailure => {
                    if let Some(rec) = self.records.get_mut(&peer) {
                        if rec.state == SessionState::WaitConfirmation {
                            rec.pending = false;
                            rec.failures += 1;
                            transition(&*self.stats, peer, rec, SessionState::Default);
                            warn!(%peer, "no ADDBA response, negotiation abandoned");
                        }
                    }
                }
                TimerKind::BlockTimeout => {
                    let open = self.records.get_mut(&peer);
                    if let Some(rec) = open.filter(|r| r.state != SessionState::Default) {
                        rec.timeouts += 1;
                    }
                    self.close_session(peer, queue, REASON_TIMEOUT)?;
                }
                TimerKind::ResetBlock => {
                    if let Some(rec) = self.records.get_mut(&peer) {
                        rec.accepted = false;
                    }
                    self.filter.discard(peer);
                    debug!(%peer, "block-ack acceptance lapsed");
                }
            }
        }
        Ok(fired)
    }

    /// Re-evaluate the session with `peer` after one of its frames left the queue.
    pub fn check_state(&mut self, peer: MacAddress, queue: &mut TransmitQueue) -> MacResult<()> {
        if self.state(&peer) != SessionState::SendBlock {
            return Ok(());
        }
        if queue.queued_for(&peer) == 0 {
            return self.close_session(peer, queue, REASON_END_BA);
        }
        self.build_blocks(peer, queue)
    }

    /// Account a frame towards `peer` handed to the channel.
    pub fn on_transmitted(&mut self, peer: MacAddress, bytes: u64, was_block: bool, now: SimTime) {
        let Some(rec) = self.records.get_mut(&peer) else { return };
        if rec.state != SessionState::SendBlock {
            return;
        }
        rec.bytes_sent += bytes;
        if was_block && self.reset_after_send {
            rec.bytes_sent = 0;
            self.timers.arm(
                TimerKey::new(peer, TimerKind::BlockTimeout),
                now + self.block_ack_timeout,
            );
        }
    }

    fn close_session(
        &mut self,
        peer: MacAddress,
        queue: &mut TransmitQueue,
        reason: u16,
    ) -> MacResult<()> {
        let Some(rec) = self.records.get_mut(&peer) else { return Ok(()) };
        if rec.state == SessionState::Default {
            return Ok(());
        }
        let tid = rec.tid;
        rec.pending = false;
        transition(&*self.stats, peer, rec, SessionState::Default);
        self.timers.cancel(TimerKey::new(peer, TimerKind::BlockTimeout));
        queue.enqueue_mgmt(MgmtFrame::delba(peer, self.own, true, tid, reason));
        info!(%peer, reason, "block-ack session closed");
        self.release_blocks(peer, queue)?;
        Ok(())
    }

    fn build_blocks(&mut self, peer: MacAddress, queue: &mut TransmitQueue) -> MacResult<()> {
        for ac in AccessCategory::ALL {
            let report = self.builder.build(peer, queue.category_mut(ac))?;
            for &entries in &report.blocks {
                self.stats.block_built(ac, entries);
            }
        }
        Ok(())
    }

    fn release_blocks(&mut self, peer: MacAddress, queue: &mut TransmitQueue) -> MacResult<()> {
        for ac in AccessCategory::ALL {
            self.builder.release(peer, queue.category_mut(ac))?;
        }
        Ok(())
    }

    /// Forget every record and timer.
    pub fn reset(&mut self) {
        self.records.clear();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DataHeader, DataUnit, FrameKind};
    use crate::queue::Outbound;
    use agg80211_core::{AggConfig, NoopStats};
    use std::sync::Mutex;

    const OWN: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 1]);
    const PEER: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 2]);

    fn ms(n: u64) -> SimTime {
        Duration::from_millis(n)
    }

    fn setup() -> (BlockAckManager, TransmitQueue) {
        let mut cfg = AggConfig::default();
        cfg.aggregation.enabled = false;
        cfg.block_ack.allow_all = true;
        let stats: Arc<dyn StatsSink> = Arc::new(NoopStats);
        let manager = BlockAckManager::new(OWN, &cfg.block_ack, stats.clone()).unwrap();
        (manager, TransmitQueue::new(&cfg, stats))
    }

    fn enqueue(queue: &mut TransmitQueue, n: usize) {
        for _ in 0..n {
            queue.enqueue_data(DataUnit::zeroed(DataHeader::new(PEER, OWN), 100)).unwrap();
        }
    }

    fn take_mgmt(queue: &mut TransmitQueue) -> MgmtFrame {
        match queue.dequeue().unwrap() {
            Some(Outbound::Management(m)) => m,
            other => panic!("expected management frame, got {other:?}"),
        }
    }

    fn response_to(request: &MgmtFrame, status: u16) -> MgmtFrame {
        let ActionBody::AddbaRequest(req) = &request.body else { panic!("not a request") };
        MgmtFrame::new(
            OWN,
            PEER,
            ActionBody::AddbaResponse(AddbaResponse {
                dialog_token: req.dialog_token,
                status,
                params: req.params,
                timeout_tu: req.timeout_tu,
            }),
        )
    }

    #[test]
    fn threshold_triggers_single_request() {
        let (mut m, mut q) = setup();
        enqueue(&mut q, 2);
        assert!(!m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap());
        enqueue(&mut q, 1);
        assert!(m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap());
        enqueue(&mut q, 1);
        assert!(!m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap());
        assert_eq!(q.mgmt_len(), 1);
        assert_eq!(m.state(&PEER), SessionState::WaitConfirmation);
        assert!(m.timers().is_armed(TimerKey::new(PEER, TimerKind::AddbaFailure)));
    }

    #[test]
    fn disallowed_peer_is_not_negotiated() {
        let (mut m, mut q) = setup();
        m.set_allow_all(false);
        enqueue(&mut q, 5);
        assert!(!m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap());
        m.allow(PEER);
        assert!(m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap());
    }

    #[test]
    fn response_opens_session_and_builds_blocks() {
        let (mut m, mut q) = setup();
        enqueue(&mut q, 5);
        m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap();
        let request = take_mgmt(&mut q);
        assert!(m.handle_action(&response_to(&request, STATUS_SUCCESS), &mut q, ms(2)).unwrap());
        assert_eq!(m.state(&PEER), SessionState::SendBlock);
        assert!(!m.timers().is_armed(TimerKey::new(PEER, TimerKind::AddbaFailure)));
        let deadline = m.timers().deadline(TimerKey::new(PEER, TimerKind::BlockTimeout));
        assert_eq!(deadline, Some(ms(102)));
        let be = q.category(AccessCategory::BestEffort);
        assert_eq!(be.len(), 1);
        assert_eq!(be.get(0).map(Frame::kind), Some(FrameKind::Block));
    }

    #[test]
    fn unmatched_response_is_fatal() {
        let (mut m, mut q) = setup();
        let stray = MgmtFrame::new(
            OWN,
            PEER,
            ActionBody::AddbaResponse(AddbaResponse {
                dialog_token: 9,
                status: STATUS_SUCCESS,
                params: BaParameterSet::from_u16(0),
                timeout_tu: 0,
            }),
        );
        assert!(matches!(
            m.handle_action(&stray, &mut q, ms(0)),
            Err(MacError::NoPendingSession { .. })
        ));
    }

    #[test]
    fn failure_timer_returns_to_default() {
        let (mut m, mut q) = setup();
        enqueue(&mut q, 3);
        m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap();
        assert!(m.fire_due(&mut q, ms(9)).unwrap().is_empty());
        let fired = m.fire_due(&mut q, ms(10)).unwrap();
        assert_eq!(fired, vec![TimerKey::new(PEER, TimerKind::AddbaFailure)]);
        assert_eq!(m.state(&PEER), SessionState::Default);
        assert_eq!(m.record(&PEER).map(|r| r.failures), Some(1));
    }

    #[test]
    fn block_timeout_sends_delba_and_releases_blocks() {
        let (mut m, mut q) = setup();
        enqueue(&mut q, 4);
        m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap();
        let request = take_mgmt(&mut q);
        m.handle_action(&response_to(&request, STATUS_SUCCESS), &mut q, ms(1)).unwrap();
        m.fire_due(&mut q, ms(101)).unwrap();
        assert_eq!(m.state(&PEER), SessionState::Default);
        let delba = take_mgmt(&mut q);
        assert!(matches!(
            delba.body,
            ActionBody::Delba(Delba { initiator: true, reason: REASON_TIMEOUT, .. })
        ));
        let be = q.category(AccessCategory::BestEffort);
        assert_eq!(be.len(), 4);
        assert!(be.iter().all(|f| f.kind() == FrameKind::Plain));
        assert_eq!(be.accounting().free(&PEER), 4);
    }

    #[test]
    fn drained_queue_ends_session() {
        let (mut m, mut q) = setup();
        enqueue(&mut q, 3);
        m.maybe_negotiate(PEER, &mut q, ms(0)).unwrap();
        let request = take_mgmt(&mut q);
        m.handle_action(&response_to(&request, STATUS_SUCCESS), &mut q, ms(1)).unwrap();
        assert!(matches!(q.dequeue().unwrap(), Some(Outbound::Data { .. })));
        m.check_state(PEER, &mut q).unwrap();
        assert_eq!(m.state(&PEER), SessionState::Default);
        let delba = take_mgmt(&mut q);
        assert!(matches!(delba.body, ActionBody::Delba(Delba { reason: REASON_END_BA, .. })));
    }

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<(bool, MacAddress)>>>);

    impl PeerFilter for Recorder {
        fn accept(&mut self, peer: MacAddress) {
            self.0.lock().unwrap().push((true, peer));
        }
        fn discard(&mut self, peer: MacAddress) {
            self.0.lock().unwrap().push((false, peer));
        }
    }

    #[test]
    fn recipient_accepts_and_lapses() {
        let (m, mut q) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut m = m.with_filter(Box::new(Recorder(log.clone())));
        let request = MgmtFrame::new(
            OWN,
            PEER,
            ActionBody::AddbaRequest(AddbaRequest {
                dialog_token: 4,
                params: BaParameterSet {
                    amsdu_supported: true,
                    immediate_policy: true,
                    tid: 0,
                    buffer_size: 128,
                },
                timeout_tu: 0,
                starting_seq: 0,
            }),
        );
        assert!(m.handle_action(&request, &mut q, ms(0)).unwrap());
        let response = take_mgmt(&mut q);
        match response.body {
            ActionBody::AddbaResponse(r) => {
                assert_eq!(r.dialog_token, 4);
                assert_eq!(r.status, STATUS_SUCCESS);
                assert_eq!(r.params.buffer_size, 64);
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(response.receiver, PEER);
        assert!(m.record(&PEER).is_some_and(|r| r.accepted));
        m.fire_due(&mut q, ms(100)).unwrap();
        assert!(m.record(&PEER).is_some_and(|r| !r.accepted));
        assert_eq!(*log.lock().unwrap(), vec![(true, PEER), (false, PEER)]);
    }

    #[test]
    fn unknown_action_is_not_consumed() {
        let (mut m, mut q) = setup();
        let unknown = ActionBody::Unknown { category: 7, action: 1, body: vec![] };
        let frame = MgmtFrame::new(OWN, PEER, unknown);

        assert!(!m.handle_action(&frame, &mut q, ms(0)).unwrap());
    }
}
