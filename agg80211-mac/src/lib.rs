#![forbid(unsafe_code)]
//! 802.11 frame aggregation and block-ack queueing engine.

pub mod accounting;
pub mod aggregation;
pub mod block;
pub mod block_ack;
pub mod builder;
pub mod classifier;
pub mod codec;
pub mod errors;
pub mod frame;
pub mod layer;
pub mod loopback;
pub mod management;
pub mod msdu;
pub mod queue;
mod sequencer;
pub mod timer;
pub mod wire;

pub use accounting::{CategoryAccounting, PeerCount};
pub use aggregation::{AggregationPolicy, Offer};
pub use block::{BlockEntry, MpduBlock};
pub use block_ack::{AddbaRecord, BlockAckManager, NoFilter, PeerFilter, SessionState};
pub use builder::{BlockBuilder, BuildReport};
pub use classifier::Classifier;
pub use codec::{decode, encode, expand, Layer, WireFrame};
pub use errors::{MacError, MacResult};
pub use frame::{
    unwrap_subframe, wrap_subframe, DataHeader, DataUnit, Frame, FrameId, FrameKind, MeshControl,
    MeshSubtype, UnitKind,
};
pub use layer::{Inbound, LinkCounters, LinkLayer};
pub use loopback::{LoopbackLink, Node, TxKind, TxRecord};
pub use management::{
    build_action, parse_action, ActionBody, AddbaRequest, AddbaResponse, BaParameterSet, Delba,
    MgmtFrame,
};

pub use msdu::{AggregateContainer, Subframe, SubframeList};
pub use queue::{Admission, CategoryQueue, Outbound, QueueCounters, QueueSnapshot, TransmitQueue};
pub use sequencer::Sequencer;
pub use timer::{SimTime, TimerKey, TimerKind, TimerQueue};
pub use wire::{encode_amsdu, encode_ampdu, parse_amsdu, parse_ampdu};
