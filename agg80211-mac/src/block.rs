#![forbid(unsafe_code)]

//! MPDU aggregate sent under a block-ack session.

use agg80211_core::MacAddress;

use crate::errors::{MacError, MacResult};
use crate::frame::{Frame, FrameId};
use crate::msdu::{padded_len, Subframe, SubframeList};

/// One MPDU of a block with its retry counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    frame: Frame,
    retries: u32,
    padding: u64,
}

impl BlockEntry {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn into_frame(self) -> Frame {
        self.frame
    }
}

impl Subframe for BlockEntry {
    fn id(&self) -> FrameId {
        self.frame.id()
    }

    fn byte_len(&self) -> u64 {
        self.frame.byte_len() + self.padding
    }

    fn pad_to(&mut self, len: u64) {
        self.padding = len.saturating_sub(self.frame.byte_len());
    }
}

/// MPDU-A towards a single peer. Entries are data units or A-MSDUs, never blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpduBlock {
    id: FrameId,
    receiver: MacAddress,
    entries: SubframeList<BlockEntry>,
}

impl MpduBlock {
    pub fn new(receiver: MacAddress) -> Self {
        Self { id: FrameId::next(), receiver, entries: SubframeList::new() }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn receiver(&self) -> MacAddress {
        self.receiver
    }

    fn entry(frame: Frame, retries: u32) -> MacResult<BlockEntry> {
        if let Frame::Block(inner) = &frame {
            return Err(MacError::InvalidEntry(format!(
                "block {} cannot be nested in a block",
                inner.id()
            )));

        }
        Ok(BlockEntry { frame, retries, padding: 0 })
    }

    pub fn push_back(&mut self, frame: Frame) -> MacResult<()> {
        self.push_back_with_retries(frame, 0)
    }

    pub fn push_back_with_retries(&mut self, frame: Frame, retries: u32) -> MacResult<()> {
        self.entries.push_back(Self::entry(frame, retries)?)
    }

    pub fn push_front(&mut self, frame: Frame) -> MacResult<()> {
        self.entries.push_front(Self::entry(frame, 0)?)
    }

    pub fn pop_back(&mut self) -> MacResult<Option<Frame>> {
        Ok(self.entries.pop_back()?.map(BlockEntry::into_frame))
    }

    pub fn pop_front(&mut self) -> MacResult<Option<Frame>> {
        Ok(self.entries.pop_front()?.map(BlockEntry::into_frame))
    }

    pub fn remove(&mut self, index: usize) -> MacResult<Option<Frame>> {
        Ok(self.entries.remove(index)?.map(BlockEntry::into_frame))
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.entries.contains(id)
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.entries.get(index).map(BlockEntry::frame)
    }

    pub fn retries(&self, index: usize) -> Option<u32> {
        self.entries.get(index).map(BlockEntry::retries)
    }

    pub fn set_retries(&mut self, index: usize, retries: u32) -> bool {
        match self.entries.get_mut(index) {
            Some(e) => {
                e.retries = retries;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.entries.count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// MSDUs carried by all entries.
    pub fn leaf_count(&self) -> usize {
        self.entries.iter().map(|e| e.frame.leaf_count()).sum()
    }

    pub fn byte_len(&self) -> u64 {
        self.entries.byte_len()
    }

    /// Entry length on air, padding included.
    pub fn entry_len(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(Subframe::byte_len)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockEntry> {
        self.entries.iter()
    }

    /// Release every entry in order.
    pub fn into_frames(mut self) -> MacResult<Vec<Frame>> {
        let mut out = Vec::with_capacity(self.count());
        while let Some(f) = self.pop_front()? {
            out.push(f);
        }
        Ok(out)
    }
}

/// Wire length of an A-MPDU subframe carrying an MPDU of `mpdu_len` octets
/// (delimiter plus padding).
pub fn ampdu_subframe_len(mpdu_len: u64) -> u64 {
    padded_len(crate::wire::MPDU_DELIMITER_LEN as u64 + mpdu_len)
}
