#![forbid(unsafe_code)]

//! Packs queued frames towards one peer into MPDU-A blocks, and unpacks them again.

use agg80211_core::{BlockAckConfig, MacAddress};
use tracing::trace;

use crate::block::MpduBlock;
use crate::errors::MacResult;
use crate::frame::Frame;
use crate::queue::CategoryQueue;

/// What one [`BlockBuilder::build`] pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Entry count of every block closed in this pass, in queue order.
    pub blocks: Vec<usize>,
    /// MSDUs moved into blocks.
    pub leaves: usize,
}

impl BuildReport {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBuilder {
    min_block: usize,
    max_block: usize,
}

impl BlockBuilder {
    pub fn new(min_block: usize, max_block: usize) -> Self {
        Self { min_block, max_block: max_block.max(1) }
    }

    pub fn from_config(cfg: &BlockAckConfig) -> Self {
        Self::new(cfg.min_block, cfg.max_block)
    }

    pub fn min_block(&self) -> usize {
        self.min_block
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    fn absorbable(frame: Option<&Frame>, peer: MacAddress) -> bool {
        matches!(frame, Some(f @ (Frame::Unit(_) | Frame::Aggregate(_))) if f.receiver() == peer)
    }

    fn absorbable_entries(queue: &CategoryQueue, peer: MacAddress) -> usize {
        queue.iter().filter(|f| Self::absorbable(Some(f), peer)).count()
    }

    /// Move free frames towards `peer` into blocks, front to back.
    ///
    /// Bounds count block entries, not MSDUs: a block opens at the position of
    /// the first free frame only while at least `min_block` free entries remain,
    /// and closes at `max_block` entries. Leaves still move from free to blocked.
    pub fn build(&self, peer: MacAddress, queue: &mut CategoryQueue) -> MacResult<BuildReport> {
        let mut report = BuildReport::default();
        if !peer.is_unicast() || queue.accounting().free(&peer) < self.min_block {
            return Ok(report);
        }
        let mut remaining = Self::absorbable_entries(queue, peer);

        let mut open: Option<usize> = None;
        let mut idx = 0;
        while idx < queue.len() && remaining > 0 {
            if !Self::absorbable(queue.get(idx), peer) {
                idx += 1;
                continue;
            }
            match open {
                None => {
                    if remaining < self.min_block {
                        break;
                    }
                    let Some(frame) = queue.take_raw(idx) else { break };
                    let leaves = frame.leaf_count();
                    let mut block = MpduBlock::new(peer);
                    // absorbable frames are never blocks, so a fresh block always takes them
                    block.push_back(frame)?;
                    queue.insert_raw(idx, Frame::Block(block));
                    queue.accounting_mut().block(peer, leaves)?;
                    report.leaves += leaves;
                    remaining -= 1;
                    open = Some(idx);
                    idx += 1;
                }
                Some(at) => {
                    let appendable = queue.get(idx).map(Frame::id).is_some_and(|id| {
                        matches!(queue.get(at), Some(Frame::Block(b)) if !b.contains(id))
                    });
                    if !appendable {
                        // not appendable to the open block; left in place as a free frame
                        remaining -= 1;
                        idx += 1;
                        continue;
                    }
                    // entries behind the open block shift left; idx stays put
                    let Some(frame) = queue.take_raw(idx) else { break };
                    let leaves = frame.leaf_count();
                    let Some(Frame::Block(block)) = queue.get_mut_raw(at) else {
                        queue.insert_raw(idx, frame);
                        break;
                    };
                    block.push_back(frame)?;
                    if block.count() >= self.max_block {
                        report.blocks.push(block.count());
                        open = None;
                    }
                    queue.accounting_mut().block(peer, leaves)?;
                    report.leaves += leaves;
                    remaining -= 1;
                }
            }
        }
        if let Some(at) = open {
            if let Some(Frame::Block(block)) = queue.get(at) {
                report.blocks.push(block.count());
            }
        }

        if !report.is_empty() {
            trace!(
                %peer,
                ac = queue.category().name(),
                blocks = report.blocks.len(),
                leaves = report.leaves,
                "blocks built"
            );
        }
        Ok(report)
    }

    /// Dissolve every block towards `peer`, putting its entries back in place
    /// as free frames. Returns the number of blocks dissolved.
    pub fn release(&self, peer: MacAddress, queue: &mut CategoryQueue) -> MacResult<usize> {
        let mut released = 0;
        let mut idx = 0;
        while idx < queue.len() && queue.accounting().blocked(&peer) > 0 {
            let is_peer_block =
                matches!(queue.get(idx), Some(Frame::Block(b)) if b.receiver() == peer);
            if !is_peer_block {
                idx += 1;
                continue;
            }
            match queue.take_raw(idx) {
                Some(Frame::Block(block)) => {
                    let leaves = block.leaf_count();
                    let frames = block.into_frames()?;
                    let n = frames.len();
                    for (k, frame) in frames.into_iter().enumerate() {
                        queue.insert_raw(idx + k, frame);
                    }
                    queue.accounting_mut().unblock(peer, leaves)?;
                    released += 1;
                    idx += n;
                }
                Some(other) => {
                    queue.insert_raw(idx, other);
                    idx += 1;
                }
                None => break,
            }
        }
        if released > 0 {
            trace!(%peer, ac = queue.category().name(), released, "blocks dissolved");
        }
        Ok(released)
    }
}
