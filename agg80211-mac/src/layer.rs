#![forbid(unsafe_code)]

//! Link layer façade wiring the transmit queues, the aggregation policy and
//! block-ack session management together.
//!
//! The layer is driven from outside: upper layers call [`LinkLayer::send`],
//! the channel calls [`LinkLayer::poll_transmit`] whenever it can take a
//! frame, and received frames come in through [`LinkLayer::receive`]. Time is
//! logical and passed in with every call.

use std::collections::HashSet;
use std::sync::Arc;

use agg80211_core::{AccessCategory, AggConfig, MacAddress, StatsSink};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::block::MpduBlock;
use crate::block_ack::{BlockAckManager, PeerFilter};
use crate::codec::{decode, expand, WireFrame};
use crate::errors::MacResult;
use crate::frame::{unwrap_subframe, DataHeader, DataUnit, Frame};
use crate::management::{parse_action, MgmtFrame};
use crate::msdu::AggregateContainer;
use crate::queue::{Admission, Outbound, TransmitQueue};
use crate::sequencer::Sequencer;
use crate::timer::SimTime;
use crate::wire::amsdu_to_container;

/// Frame received from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Data(DataUnit),
    Aggregate(AggregateContainer),
    Block(MpduBlock),
    /// Aggregate in nested layer form.
    Wire(WireFrame),
    /// Aggregate as A-MSDU octets under its MAC header.
    Amsdu { header: DataHeader, body: Bytes },
    Management(MgmtFrame),
    /// Action frame body octets.
    Action { receiver: MacAddress, transmitter: MacAddress, body: Bytes },
}

impl Inbound {
    fn receiver(&self) -> MacAddress {
        match self {
            Inbound::Data(u) => u.receiver(),
            Inbound::Aggregate(c) => c.receiver(),
            Inbound::Block(b) => b.receiver(),
            Inbound::Wire(w) => w.header.receiver,
            Inbound::Amsdu { header, .. } => header.receiver,
            Inbound::Management(m) => m.receiver,
            Inbound::Action { receiver, .. } => *receiver,
        }
    }
}

impl From<Frame> for Inbound {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Unit(u) => Inbound::Data(u),
            Frame::Aggregate(c) => Inbound::Aggregate(c),
            Frame::Block(b) => Inbound::Block(b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    pub units_delivered: u64,
    pub aggregates_received: u64,
    pub not_for_us: u64,
    pub mgmt_received: u64,
    pub mgmt_dropped: u64,
    pub data_sent: u64,
    pub blocks_sent: u64,
    pub bytes_sent: u64,
}

pub struct LinkLayer {
    address: MacAddress,
    config: AggConfig,
    queue: TransmitQueue,
    sessions: BlockAckManager,
    sequencer: Sequencer,
    counters: LinkCounters,
    stats: Arc<dyn StatsSink>,
}

impl std::fmt::Debug for LinkLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkLayer")
            .field("address", &self.address)
            .field("queue", &self.queue)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl LinkLayer {
    pub fn new(
        address: MacAddress,
        config: AggConfig,
        stats: Arc<dyn StatsSink>,
    ) -> MacResult<Self> {
        config.validate()?;
        let queue = TransmitQueue::new(&config, stats.clone());
        let sessions = BlockAckManager::new(address, &config.block_ack, stats.clone())?;
        info!(%address, "link layer up");
        Ok(Self {
            address,
            config,
            queue,
            sessions,
            sequencer: Sequencer::new(),
            counters: LinkCounters::default(),
            stats,
        })
    }

    pub fn with_filter(mut self, filter: Box<dyn PeerFilter>) -> Self {
        self.sessions = self.sessions.with_filter(filter);
        self
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn config(&self) -> &AggConfig {
        &self.config
    }

    pub fn queue(&self) -> &TransmitQueue {
        &self.queue
    }

    pub fn sessions(&self) -> &BlockAckManager {
        &self.sessions
    }

    pub fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    pub fn allow(&mut self, peer: MacAddress) {
        self.sessions.allow(peer);
    }

    pub fn disallow(&mut self, peer: MacAddress) -> MacResult<()> {
        self.sessions.disallow(peer, &mut self.queue)
    }

    /// Accept a data unit from the upper layer.
    pub fn send(&mut self, mut unit: DataUnit, now: SimTime) -> MacResult<Admission> {
        let receiver = unit.receiver();
        let header = unit.header_mut();
        if header.transmitter.is_unspecified() {
            header.transmitter = self.address;
        }
        // only admitted units consume a sequence number
        header.sequence = self.sequencer.peek(&receiver);

        let admission = self.queue.enqueue_data(unit)?;
        if !matches!(admission, Admission::Dropped) {
            self.sequencer.next(receiver);
        }
        if matches!(admission, Admission::Queued | Admission::Merged) {
            self.sessions.maybe_negotiate(receiver, &mut self.queue, now)?;
        }
        Ok(admission)
    }

    /// Hand the next frame to the channel, firing due timers first.
    pub fn poll_transmit(&mut self, now: SimTime) -> MacResult<Option<Outbound>> {
        self.advance(now)?;
        let out = self.queue.dequeue()?;
        if let Some(out) = &out {
            self.after_dequeue(out, now)?;
        }
        Ok(out)
    }

    /// Channel access granted for one category.
    pub fn request_frame(
        &mut self,
        ac: AccessCategory,
        now: SimTime,
    ) -> MacResult<Option<Outbound>> {
        self.advance(now)?;
        let out = self.queue.request_frame(ac)?;
        if let Some(out) = &out {
            self.after_dequeue(out, now)?;
        }
        Ok(out)
    }

    fn after_dequeue(&mut self, out: &Outbound, now: SimTime) -> MacResult<()> {
        let Outbound::Data { frame, .. } = out else { return Ok(()) };
        let peer = frame.receiver();
        let bytes = frame.byte_len();
        let is_block = matches!(frame, Frame::Block(_));
        self.counters.data_sent += 1;
        self.counters.bytes_sent += bytes;
        if is_block {
            self.counters.blocks_sent += 1;
        }
        self.sessions.on_transmitted(peer, bytes, is_block, now);
        self.sessions.check_state(peer, &mut self.queue)
    }

    /// Fire every timer due at `now`. Returns how many fired.
    pub fn advance(&mut self, now: SimTime) -> MacResult<usize> {
        Ok(self.sessions.fire_due(&mut self.queue, now)?.len())
    }

    pub fn next_timer(&self) -> Option<SimTime> {
        self.sessions.next_deadline()
    }

    fn accepts(&self, receiver: &MacAddress) -> bool {
        *receiver == self.address || receiver.is_multicast()
    }

    /// Process a frame from the channel. Returns the data units to deliver upwards.
    pub fn receive(&mut self, inbound: Inbound, now: SimTime) -> MacResult<Vec<DataUnit>> {
        if !self.accepts(&inbound.receiver()) {
            self.counters.not_for_us += 1;
            return Ok(Vec::new());
        }
        let units = match inbound {
            Inbound::Data(unit) => vec![unwrap_subframe(unit)],
            Inbound::Aggregate(container) => self.expand_aggregate(container)?,
            Inbound::Wire(frame) => self.expand_aggregate(decode(frame)?)?,
            Inbound::Amsdu { header, body } => {
                self.expand_aggregate(amsdu_to_container(&header, &body)?)?
            }
            Inbound::Block(block) => {
                let mut units = Vec::new();
                for frame in block.into_frames()? {
                    units.extend(self.receive(frame.into(), now)?);
                }
                return Ok(units);
            }
            Inbound::Management(frame) => {
                self.receive_mgmt(frame, now)?;
                Vec::new()
            }
            Inbound::Action { receiver, transmitter, body } => {
                match parse_action(&body) {
                    Ok((_, parsed)) => {
                        self.receive_mgmt(MgmtFrame::new(receiver, transmitter, parsed), now)?
                    }
                    Err(e) => {
                        self.counters.mgmt_received += 1;
                        self.drop_mgmt(transmitter, &format!("{e:?}"));
                    }
                }
                Vec::new()
            }
        };
        self.counters.units_delivered += units.len() as u64;
        Ok(units)
    }

    fn expand_aggregate(&mut self, container: AggregateContainer) -> MacResult<Vec<DataUnit>> {
        self.counters.aggregates_received += 1;
        expand(container)
    }

    fn receive_mgmt(&mut self, frame: MgmtFrame, now: SimTime) -> MacResult<()> {
        self.counters.mgmt_received += 1;
        if !self.sessions.handle_action(&frame, &mut self.queue, now)? {
            self.drop_mgmt(frame.transmitter, frame.body.name());
        }
        Ok(())
    }

    fn drop_mgmt(&mut self, from: MacAddress, what: &str) {
        self.counters.mgmt_dropped += 1;
        self.stats.mgmt_frame_dropped();
        debug!(%from, what, "management frame dropped");
    }

    /// Take over a new configuration. Peers that left the configured allow
    /// list lose their session; queued frames are kept.
    pub fn apply_config(&mut self, config: AggConfig) -> MacResult<()> {
        config.validate()?;
        let kept: HashSet<MacAddress> = config.block_ack.allowed_peers()?.into_iter().collect();
        for peer in self.config.block_ack.allowed_peers()? {
            if !kept.contains(&peer) {
                self.sessions.disallow(peer, &mut self.queue)?;
            }
        }
        self.queue.apply_config(&config);
        self.sessions.apply_config(&config.block_ack)?;
        self.config = config;
        info!(address = %self.address, "configuration applied");
        Ok(())
    }

    /// Apply the latest configuration published on `rx`, if it changed.
    pub fn refresh_config(&mut self, rx: &mut watch::Receiver<Arc<AggConfig>>) -> MacResult<bool> {
        if !rx.has_changed().unwrap_or(false) {
            return Ok(false);
        }
        let config = AggConfig::clone(&rx.borrow_and_update());
        self.apply_config(config)?;
        Ok(true)
    }

    /// Drop every queued frame, session and timer.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.sessions.reset();
        info!(address = %self.address, "link layer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_ack::SessionState;
    use crate::errors::MacError;
    use crate::management::ActionBody;
    use agg80211_core::NoopStats;
    use std::time::Duration;

    const A: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 1]);
    const B: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 2]);

    fn layer() -> LinkLayer {
        let mut cfg = AggConfig::default();
        cfg.block_ack.allow_all = true;
        LinkLayer::new(A, cfg, Arc::new(NoopStats)).unwrap()
    }

    fn unit(len: usize) -> DataUnit {
        DataUnit::zeroed(DataHeader::new(B, MacAddress::UNSPECIFIED), len)
    }

    #[test]
    fn send_assigns_sequence_and_transmitter() {
        let mut l = layer();
        l.send(unit(10), Duration::ZERO).unwrap();
        let other = DataHeader::new(MacAddress::local(9), MacAddress::UNSPECIFIED);
        l.send(DataUnit::zeroed(other, 10), Duration::ZERO).unwrap();
        let Some(Outbound::Data { frame, .. }) = l.poll_transmit(Duration::ZERO).unwrap() else {
            panic!("expected data");
        };
        let header = frame.header().unwrap();
        assert_eq!(header.transmitter, A);
        assert_eq!(header.sequence, 0);
    }

    #[test]
    fn refused_units_leave_sequence_untouched() {
        let mut cfg = AggConfig::default();
        cfg.aggregation.enabled = false;
        cfg.queue.frame_capacity = 1;
        let mut l = LinkLayer::new(A, cfg, Arc::new(NoopStats)).unwrap();
        assert_eq!(l.send(unit(10), Duration::ZERO).unwrap(), Admission::Queued);
        assert_eq!(l.send(unit(10), Duration::ZERO).unwrap(), Admission::Dropped);
        assert!(matches!(l.send(unit(3000), Duration::ZERO), Err(MacError::FrameTooLong { .. })));

        let sequence_of = |out: Option<Outbound>| match out {
            Some(Outbound::Data { frame, .. }) => frame.header().map(|h| h.sequence),
            _ => None,
        };
        assert_eq!(sequence_of(l.poll_transmit(Duration::ZERO).unwrap()), Some(0));
        assert_eq!(l.send(unit(10), Duration::ZERO).unwrap(), Admission::Queued);
        assert_eq!(sequence_of(l.poll_transmit(Duration::ZERO).unwrap()), Some(1));
    }

    #[test]
    fn threshold_queues_addba_ahead_of_data() {
        let mut l = layer();
        for _ in 0..3 {
            l.send(unit(100), Duration::ZERO).unwrap();
        }
        // three units merged into one aggregate, three free frames towards B
        assert_eq!(l.sessions().state(&B), SessionState::WaitConfirmation);
        match l.poll_transmit(Duration::ZERO).unwrap() {
            Some(Outbound::Management(m)) => assert!(matches!(m.body, ActionBody::AddbaRequest(_))),
            other => panic!("expected ADDBA request, got {other:?}"),
        }
    }

    #[test]
    fn frames_for_others_are_ignored() {
        let mut l = layer();
        let stray = DataUnit::zeroed(DataHeader::new(MacAddress::local(77), B), 5);
        assert!(l.receive(Inbound::Data(stray), Duration::ZERO).unwrap().is_empty());
        assert_eq!(l.counters().not_for_us, 1);
    }

    #[test]
    fn garbage_action_is_counted_and_dropped() {
        let mut l = layer();
        let body = Bytes::from_static(&[3, 1, 0]);
        let inbound = Inbound::Action { receiver: A, transmitter: B, body };
        let out = l.receive(inbound, Duration::ZERO).unwrap();
        assert!(out.is_empty());
        assert_eq!(l.counters().mgmt_dropped, 1);
        let unknown = Bytes::from_static(&[127, 0]);
        let inbound = Inbound::Action { receiver: A, transmitter: B, body: unknown };
        l.receive(inbound, Duration::ZERO).unwrap();

        assert_eq!(l.counters().mgmt_dropped, 2);
    }

    #[test]
    fn apply_config_drops_removed_peers() {
        let mut cfg = AggConfig::default();
        cfg.block_ack.allow_list = vec![B.to_string()];
        let mut l = LinkLayer::new(A, cfg.clone(), Arc::new(NoopStats)).unwrap();
        for _ in 0..3 {
            l.send(unit(100), Duration::ZERO).unwrap();
        }
        assert!(l.sessions().record(&B).is_some());
        cfg.block_ack.allow_list.clear();
        l.apply_config(cfg).unwrap();
        assert!(l.sessions().record(&B).is_none());
        assert!(!l.sessions().is_allowed(&B));
    }

    #[test]
    fn refresh_picks_up_published_config() {
        let mut l = layer();
        let (tx, mut rx) = watch::channel(Arc::new(l.config().clone()));
        assert!(!l.refresh_config(&mut rx).unwrap());
        let mut next = l.config().clone();
        next.queue.frame_capacity = 1;
        tx.send(Arc::new(next)).unwrap();
        assert!(l.refresh_config(&mut rx).unwrap());
        assert_eq!(l.config().queue.frame_capacity, 1);
    }

    #[test]
    fn shutdown_clears_state() {
        let mut l = layer();
        for _ in 0..5 {
            l.send(unit(100), Duration::ZERO).unwrap();
        }
        l.shutdown();
        assert!(l.queue().is_empty());
        assert!(l.next_timer().is_none());
    }
}
