#![forbid(unsafe_code)]

//! Two link layers joined by an ideal channel.
//!
//! Every step advances logical time, delivers frames whose latency has
//! elapsed and lets each node put at most one frame on the channel.
//! Management frames cross the channel as action octets and aggregates in
//! nested layer form, so both codecs are exercised end to end.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::codec::encode;
use crate::errors::MacResult;
use crate::frame::{DataUnit, Frame, FrameKind};
use crate::layer::{Inbound, LinkLayer};
use crate::queue::{Admission, Outbound};
use crate::timer::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    A,
    B,
}

impl Node {
    pub fn peer(self) -> Node {
        match self {
            Node::A => Node::B,
            Node::B => Node::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Action(&'static str),
    Data(FrameKind),
}

/// One frame put on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub at: SimTime,
    pub from: Node,
    pub kind: TxKind,
    /// MSDUs carried (zero for management frames).
    pub leaves: usize,
    /// Entries of a block.
    pub entries: usize,
}

pub struct LoopbackLink {
    a: LinkLayer,
    b: LinkLayer,
    now: SimTime,
    latency: Duration,
    in_flight: VecDeque<(SimTime, Node, Inbound)>,
    log: Vec<TxRecord>,
    delivered_a: Vec<DataUnit>,
    delivered_b: Vec<DataUnit>,
}

fn to_inbound(out: Outbound) -> MacResult<Inbound> {
    Ok(match out {
        Outbound::Management(m) => {
            let body = Bytes::from(m.to_bytes());
            Inbound::Action { receiver: m.receiver, transmitter: m.transmitter, body }
        }
        Outbound::Data { frame: Frame::Aggregate(c), .. } => Inbound::Wire(encode(c)?),
        Outbound::Data { frame, .. } => frame.into(),
    })
}

impl LoopbackLink {
    pub fn new(a: LinkLayer, b: LinkLayer, latency: Duration) -> Self {
        Self {
            a,
            b,
            now: Duration::ZERO,
            latency,
            in_flight: VecDeque::new(),
            log: Vec::new(),
            delivered_a: Vec::new(),
            delivered_b: Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn node(&self, node: Node) -> &LinkLayer {
        match node {
            Node::A => &self.a,
            Node::B => &self.b,
        }
    }

    pub fn node_mut(&mut self, node: Node) -> &mut LinkLayer {
        match node {
            Node::A => &mut self.a,
            Node::B => &mut self.b,
        }
    }

    /// Units delivered to the upper layer of `node`, in arrival order.
    pub fn delivered(&self, node: Node) -> &[DataUnit] {
        match node {
            Node::A => &self.delivered_a,
            Node::B => &self.delivered_b,
        }
    }

    pub fn log(&self) -> &[TxRecord] {
        &self.log
    }

    pub fn send(&mut self, from: Node, unit: DataUnit) -> MacResult<Admission> {
        let now = self.now;
        self.node_mut(from).send(unit, now)
    }

    /// Advance by `dt` and run one channel round.
    pub fn step(&mut self, dt: Duration) -> MacResult<()> {
        self.now += dt;
        let now = self.now;

        while self.in_flight.front().is_some_and(|(at, _, _)| *at <= now) {
            let Some((_, to, inbound)) = self.in_flight.pop_front() else { break };
            let units = self.node_mut(to).receive(inbound, now)?;
            match to {
                Node::A => self.delivered_a.extend(units),
                Node::B => self.delivered_b.extend(units),
            }
        }

        for from in [Node::A, Node::B] {
            let Some(out) = self.node_mut(from).poll_transmit(now)? else { continue };
            let record = match &out {
                Outbound::Management(m) => TxRecord {
                    at: now,
                    from,
                    kind: TxKind::Action(m.body.name()),
                    leaves: 0,
                    entries: 0,
                },
                Outbound::Data { frame, .. } => TxRecord {
                    at: now,
                    from,
                    kind: TxKind::Data(frame.kind()),
                    leaves: frame.leaf_count(),
                    entries: match frame {
                        Frame::Block(b) => b.count(),
                        _ => 1,
                    },
                },
            };
            trace!(?from, kind = ?record.kind, at = ?now, "frame on channel");
            self.log.push(record);
            self.in_flight.push_back((now + self.latency, from.peer(), to_inbound(out)?));
        }
        Ok(())
    }

    /// Both queues drained and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.a.queue().is_empty() && self.b.queue().is_empty()
    }

    /// Step until idle or `max_steps` ran out. Returns the steps taken.
    pub fn run_until_idle(&mut self, dt: Duration, max_steps: usize) -> MacResult<usize> {
        for taken in 0..max_steps {
            if self.is_idle() {
                return Ok(taken);
            }
            self.step(dt)?;
        }
        Ok(max_steps)
    }

    /// Step for `duration` of logical time.
    pub fn run_for(&mut self, duration: Duration, dt: Duration) -> MacResult<()> {
        let end = self.now + duration;
        while self.now < end {
            self.step(dt)?;
        }
        Ok(())
    }
}
