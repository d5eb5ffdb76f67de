#![forbid(unsafe_code)]

//! Data-plane frame model.
//!
//! A [`DataUnit`] is one MSDU with its 802.11 data header. Units travel through
//! the queues either on their own, merged into an [`AggregateContainer`], or as
//! an entry of an [`MpduBlock`]; [`Frame`] is the queue entry sum type.
//!
//! Lengths are tracked in octets as `u64` and always include the header the
//! unit currently carries, so wrapping a unit as an A-MSDU subframe changes
//! its length without touching the payload.

use std::sync::atomic::{AtomicU64, Ordering};

use agg80211_core::MacAddress;
use bytes::Bytes;

use crate::block::MpduBlock;
use crate::msdu::AggregateContainer;

/// Plain QoS data header including FCS.
pub const DATA_HEADER_LEN: u64 = 28;
/// LLC/SNAP encapsulation carried in front of the payload.
pub const SNAP_HEADER_LEN: u64 = 8;
/// Mesh data header (4-address QoS header, mesh control, FCS).
pub const MESH_HEADER_LEN: u64 = 38;
/// A-MSDU subframe header: DA, SA, length.
pub const SUBFRAME_HEADER_LEN: u64 = 14;
/// A-MSDU subframe header followed by 6-octet mesh control.
pub const MESH_SUBFRAME_HEADER_LEN: u64 = 20;
/// Sequence numbers are 12 bits wide.
pub const SEQ_MODULO: u16 = 4096;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique frame identity. Clones share the id of their source, which
/// is what the duplicate checks of the aggregate types rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub fn next() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mesh control subtype. Only upper-layer messages originate locally; the
/// other two are frames in transit through this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshSubtype {
    UpperMessage,
    Routing,
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshControl {
    pub subtype: MeshSubtype,
    pub ttl: u8,
    pub mesh_seq: u32,
}

impl MeshControl {
    pub fn upper(ttl: u8, mesh_seq: u32) -> Self {
        Self { subtype: MeshSubtype::UpperMessage, ttl, mesh_seq }
    }
}

/// 802.11 data header fields the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHeader {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub address3: MacAddress,
    pub address4: MacAddress,
    pub to_ds: bool,
    pub from_ds: bool,
    /// 12-bit sequence number, assigned on [`crate::LinkLayer::send`].
    pub sequence: u16,
    /// 802.1D user priority / TID.
    pub tid: u8,
    pub with_snap: bool,
    pub mesh: Option<MeshControl>,
}

impl DataHeader {
    /// Header for an independent (no DS) unicast or group transmission.
    pub fn new(receiver: MacAddress, transmitter: MacAddress) -> Self {
        Self {
            receiver,
            transmitter,
            address3: MacAddress::UNSPECIFIED,
            address4: MacAddress::UNSPECIFIED,
            to_ds: false,
            from_ds: false,
            sequence: 0,
            tid: 0,
            with_snap: true,
            mesh: None,
        }
    }

    pub fn with_tid(mut self, tid: u8) -> Self {
        self.tid = tid & 0x0F;
        self
    }

    pub fn with_mesh(mut self, mesh: MeshControl) -> Self {
        self.mesh = Some(mesh);
        self.to_ds = true;
        self.from_ds = true;
        self
    }

    pub fn with_addresses(mut self, address3: MacAddress, address4: MacAddress) -> Self {
        self.address3 = address3;
        self.address4 = address4;
        self
    }

    pub fn without_snap(mut self) -> Self {
        self.with_snap = false;
        self
    }

    /// Any part of the destination triple is a group address.
    pub fn is_group_addressed(&self) -> bool {
        self.receiver.is_multicast() || self.address3.is_multicast() || self.address4.is_multicast()
    }

    /// Same receiver, destination triple and DS direction.
    pub fn same_flow(&self, other: &DataHeader) -> bool {
        self.receiver == other.receiver
            && self.address3 == other.address3
            && self.address4 == other.address4
            && self.to_ds == other.to_ds
            && self.from_ds == other.from_ds
    }

    pub fn mesh_subtype(&self) -> Option<MeshSubtype> {
        self.mesh.map(|m| m.subtype)
    }

    /// Mesh frame being relayed rather than originated here.
    pub fn is_in_transit(&self) -> bool {
        matches!(self.mesh_subtype(), Some(MeshSubtype::Routing | MeshSubtype::Relay))
    }

    /// Final destination per the DS address table.
    pub fn destination(&self) -> MacAddress {
        if self.to_ds {
            self.address3
        } else {
            self.receiver
        }
    }

    /// Original source per the DS address table.
    pub fn source(&self) -> MacAddress {
        match (self.to_ds, self.from_ds) {
            (true, true) => self.address4,
            (false, true) => self.address3,
            _ => self.transmitter,
        }
    }

    /// Inverse of [`destination`](Self::destination) / [`source`](Self::source).
    pub fn set_endpoints(&mut self, destination: MacAddress, source: MacAddress) {
        match (self.to_ds, self.from_ds) {
            (false, false) => {
                self.receiver = destination;
                self.transmitter = source;
            }
            (true, false) => {
                self.address3 = destination;
                self.transmitter = source;
            }
            (false, true) => {
                self.receiver = destination;
                self.address3 = source;
            }
            (true, true) => {
                self.address3 = destination;
                self.address4 = source;
            }
        }
    }
}

/// Shape of a [`DataUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Ordinary data frame.
    Plain,
    /// A-MSDU subframe of a plain frame.
    PlainWithHeader,
    /// Mesh data frame.
    MeshPlain,
    /// A-MSDU subframe of a mesh frame.
    MeshSubframe,
}

impl UnitKind {
    pub fn is_subframe(self) -> bool {
        matches!(self, UnitKind::PlainWithHeader | UnitKind::MeshSubframe)
    }
}

/// Leaf data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUnit {
    id: FrameId,
    kind: UnitKind,
    header: DataHeader,
    byte_len: u64,
    payload: Option<Bytes>,
}

impl DataUnit {
    /// Plain or mesh data unit carrying `payload`.
    pub fn new(header: DataHeader, payload: Bytes) -> Self {
        let kind = if header.mesh.is_some() { UnitKind::MeshPlain } else { UnitKind::Plain };
        let mut unit = Self { id: FrameId::next(), kind, header, byte_len: 0, payload: None };
        unit.byte_len = unit.header_len();
        unit.encapsulate(payload);
        unit
    }

    /// Unit with a zero-filled payload of `payload_len` octets.
    pub fn zeroed(header: DataHeader, payload_len: usize) -> Self {
        Self::new(header, Bytes::from(vec![0u8; payload_len]))
    }

    /// Header-only unit of the given shape; the length covers the header alone.
    pub fn bare(kind: UnitKind, header: DataHeader) -> Self {
        let mut unit = Self { id: FrameId::next(), kind, header, byte_len: 0, payload: None };
        unit.byte_len = unit.header_len();
        unit
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut DataHeader {
        &mut self.header
    }

    pub fn receiver(&self) -> MacAddress {
        self.header.receiver
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub(crate) fn set_byte_len(&mut self, len: u64) {
        self.byte_len = len;
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.as_ref().map_or(0, |p| p.len() as u64)
    }

    pub fn is_subframe(&self) -> bool {
        self.kind.is_subframe()
    }

    /// Plain or mesh data unit not wrapped as a subframe.
    pub fn is_plain_data(&self) -> bool {
        matches!(self.kind, UnitKind::Plain | UnitKind::MeshPlain)
    }

    /// Length of the header this unit carries in its current shape.
    pub fn header_len(&self) -> u64 {
        match self.kind {
            UnitKind::Plain => {
                DATA_HEADER_LEN + if self.header.with_snap { SNAP_HEADER_LEN } else { 0 }
            }

            UnitKind::MeshPlain => MESH_HEADER_LEN,
            UnitKind::PlainWithHeader => SUBFRAME_HEADER_LEN,
            UnitKind::MeshSubframe => MESH_SUBFRAME_HEADER_LEN,
        }
    }

    /// Attach `payload`, replacing any previous one. The length follows.
    pub fn encapsulate(&mut self, payload: Bytes) {
        if let Some(old) = self.payload.take() {
            self.byte_len = self.byte_len.saturating_sub(old.len() as u64);
        }
        self.byte_len += payload.len() as u64;
        self.payload = Some(payload);
    }

    /// Detach the payload. The length shrinks by the payload length.
    pub fn decapsulate(&mut self) -> Option<Bytes> {
        let payload = self.payload.take()?;
        self.byte_len = self.byte_len.saturating_sub(payload.len() as u64);
        Some(payload)
    }

    /// Attach a payload without adjusting the length. Used when the length
    /// was recorded on the wire and already accounts for the payload.
    pub(crate) fn attach_payload(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }
}

/// Re-shape a plain unit as an A-MSDU subframe. Already wrapped units are returned unchanged.
pub fn wrap_subframe(mut unit: DataUnit) -> DataUnit {
    let kind = match unit.kind {
        UnitKind::Plain => UnitKind::PlainWithHeader,
        UnitKind::MeshPlain => UnitKind::MeshSubframe,
        _ => return unit,
    };
    let payload = unit.decapsulate();
    unit.kind = kind;
    unit.byte_len = unit.header_len();
    if let Some(p) = payload {
        unit.encapsulate(p);
    }
    unit
}

/// Strip the subframe header, restoring the plain shape. Padding is dropped.
pub fn unwrap_subframe(mut unit: DataUnit) -> DataUnit {
    let kind = match unit.kind {
        UnitKind::PlainWithHeader => UnitKind::Plain,
        UnitKind::MeshSubframe => UnitKind::MeshPlain,
        _ => return unit,
    };
    let payload = unit.payload.take();
    unit.kind = kind;
    unit.byte_len = unit.header_len();
    if let Some(p) = payload {
        unit.encapsulate(p);
    }
    unit
}

/// Variant tag of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Plain,
    PlainWithHeader,
    MeshPlain,
    MeshSubframe,
    Aggregate,
    Block,
}

impl From<UnitKind> for FrameKind {
    fn from(kind: UnitKind) -> Self {
        match kind {
            UnitKind::Plain => FrameKind::Plain,
            UnitKind::PlainWithHeader => FrameKind::PlainWithHeader,
            UnitKind::MeshPlain => FrameKind::MeshPlain,
            UnitKind::MeshSubframe => FrameKind::MeshSubframe,
        }
    }
}

/// Entry of a category queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Unit(DataUnit),
    Aggregate(AggregateContainer),
    Block(MpduBlock),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Unit(u) => u.kind().into(),
            Frame::Aggregate(_) => FrameKind::Aggregate,
            Frame::Block(_) => FrameKind::Block,
        }
    }

    pub fn id(&self) -> FrameId {
        match self {
            Frame::Unit(u) => u.id(),
            Frame::Aggregate(c) => c.id(),
            Frame::Block(b) => b.id(),
        }
    }

    pub fn receiver(&self) -> MacAddress {
        match self {
            Frame::Unit(u) => u.receiver(),
            Frame::Aggregate(c) => c.receiver(),
            Frame::Block(b) => b.receiver(),
        }
    }

    /// Data header for units and containers. Blocks only carry a receiver.
    pub fn header(&self) -> Option<&DataHeader> {
        match self {
            Frame::Unit(u) => Some(u.header()),
            Frame::Aggregate(c) => Some(c.header()),
            Frame::Block(_) => None,
        }
    }

    pub fn byte_len(&self) -> u64 {
        match self {
            Frame::Unit(u) => u.byte_len(),
            Frame::Aggregate(c) => c.byte_len(),
            Frame::Block(b) => b.byte_len(),
        }
    }

    /// Number of MSDUs carried.
    pub fn leaf_count(&self) -> usize {
        match self {
            Frame::Unit(_) => 1,
            Frame::Aggregate(c) => c.count(),
            Frame::Block(b) => b.leaf_count(),
        }
    }

    pub fn is_group_addressed(&self) -> bool {
        match self.header() {
            Some(h) => h.is_group_addressed(),
            None => self.receiver().is_multicast(),
        }
    }
}

impl From<DataUnit> for Frame {
    fn from(unit: DataUnit) -> Self {
        Frame::Unit(unit)
    }
}

impl From<AggregateContainer> for Frame {
    fn from(container: AggregateContainer) -> Self {
        Frame::Aggregate(container)
    }
}

impl From<MpduBlock> for Frame {
    fn from(block: MpduBlock) -> Self {
        Frame::Block(block)
    }
}
