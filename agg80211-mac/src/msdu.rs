#![forbid(unsafe_code)]

//! A-MSDU aggregate container and the padded entry list it shares with
//! [`crate::block::MpduBlock`].
//!
//! Both aggregate types keep a running total of their entry lengths. On every
//! append the entry that stops being last is padded up to a multiple of four
//! octets, so only the final entry may end unaligned.

use std::collections::VecDeque;

use agg80211_core::MacAddress;

use crate::errors::{MacError, MacResult};
use crate::frame::{
    unwrap_subframe, wrap_subframe, DataHeader, DataUnit, FrameId, MeshSubtype, DATA_HEADER_LEN,
    MESH_HEADER_LEN, SNAP_HEADER_LEN,
};


/// Entry of a padded aggregate.
pub trait Subframe {
    fn id(&self) -> FrameId;
    fn byte_len(&self) -> u64;
    /// Grow the entry to `len` octets. Only ever called with `len >= byte_len()`.
    fn pad_to(&mut self, len: u64);
}

impl Subframe for DataUnit {
    fn id(&self) -> FrameId {
        DataUnit::id(self)
    }

    fn byte_len(&self) -> u64 {
        DataUnit::byte_len(self)
    }

    fn pad_to(&mut self, len: u64) {
        self.set_byte_len(len);
    }
}

/// Round `len` up to the next multiple of four.
pub fn padded_len(len: u64) -> u64 {
    (len + 3) & !3
}

/// Ordered entries with a tracked total length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubframeList<E> {
    entries: VecDeque<E>,
    byte_len: u64,
}

impl<E> Default for SubframeList<E> {
    fn default() -> Self {
        Self { entries: VecDeque::new(), byte_len: 0 }
    }
}

impl<E: Subframe> SubframeList<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    fn check_duplicate(&self, entry: &E) -> MacResult<()> {
        if self.contains(entry.id()) {
            return Err(MacError::DuplicateEntry { id: entry.id().get() });
        }
        Ok(())
    }

    /// Append, padding the previous last entry.
    pub fn push_back(&mut self, entry: E) -> MacResult<()> {
        self.check_duplicate(&entry)?;
        if let Some(last) = self.entries.back_mut() {
            let old = last.byte_len();
            let padded = padded_len(old);
            if padded != old {
                last.pad_to(padded);
                self.byte_len += padded - old;
            }
        }
        self.byte_len += entry.byte_len();
        self.entries.push_back(entry);
        Ok(())
    }

    /// Prepend. A new front entry that is not also the last one is padded.
    pub fn push_front(&mut self, mut entry: E) -> MacResult<()> {
        self.check_duplicate(&entry)?;
        if !self.entries.is_empty() {
            let padded = padded_len(entry.byte_len());
            entry.pad_to(padded);
        }
        self.byte_len += entry.byte_len();
        self.entries.push_front(entry);
        Ok(())
    }

    fn checked_release(&self, entry_len: u64) -> MacResult<u64> {
        self.byte_len
            .checked_sub(entry_len)
            .ok_or(MacError::LengthUnderflow { tracked: self.byte_len, entry: entry_len })
    }

    pub fn pop_back(&mut self) -> MacResult<Option<E>> {
        let Some(len) = self.entries.back().map(|e| e.byte_len()) else {
            return Ok(None);
        };
        self.byte_len = self.checked_release(len)?;
        Ok(self.entries.pop_back())
    }

    pub fn pop_front(&mut self) -> MacResult<Option<E>> {
        let Some(len) = self.entries.front().map(|e| e.byte_len()) else {
            return Ok(None);
        };
        self.byte_len = self.checked_release(len)?;
        Ok(self.entries.pop_front())
    }

    pub fn remove(&mut self, index: usize) -> MacResult<Option<E>> {
        let Some(len) = self.entries.get(index).map(|e| e.byte_len()) else {
            return Ok(None);
        };
        self.byte_len = self.checked_release(len)?;
        Ok(self.entries.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut E> {
        self.entries.get_mut(index)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }
}

/// A-MSDU: several data units towards one receiver sent as a single MPDU.
///
/// Entries are held in subframe shape; everything handed back to callers is
/// unwrapped again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateContainer {
    id: FrameId,
    header: DataHeader,
    entries: SubframeList<DataUnit>,
}

impl AggregateContainer {
    /// Empty container addressed like `header`.
    pub fn new(header: DataHeader) -> Self {
        Self { id: FrameId::next(), header, entries: SubframeList::new() }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    pub fn receiver(&self) -> MacAddress {
        self.header.receiver
    }

    pub fn is_mesh(&self) -> bool {
        self.header.mesh.is_some()
    }

    pub fn mesh_subtype(&self) -> Option<MeshSubtype> {
        self.header.mesh_subtype()
    }

    pub fn push_back(&mut self, unit: DataUnit) -> MacResult<()> {
        self.entries.push_back(wrap_subframe(unit))
    }

    pub fn push_front(&mut self, unit: DataUnit) -> MacResult<()> {
        self.entries.push_front(wrap_subframe(unit))
    }

    pub fn pop_back(&mut self) -> MacResult<Option<DataUnit>> {
        Ok(self.entries.pop_back()?.map(unwrap_subframe))
    }

    pub fn pop_front(&mut self) -> MacResult<Option<DataUnit>> {
        Ok(self.entries.pop_front()?.map(unwrap_subframe))
    }

    /// Last entry still in subframe shape, padding included.
    pub(crate) fn pop_back_subframe(&mut self) -> MacResult<Option<DataUnit>> {
        self.entries.pop_back()
    }

    pub fn remove(&mut self, index: usize) -> MacResult<Option<DataUnit>> {
        Ok(self.entries.remove(index)?.map(unwrap_subframe))
    }

    /// Entry `index` in subframe shape.
    pub fn get(&self, index: usize) -> Option<&DataUnit> {
        self.entries.get(index)
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.entries.contains(id)
    }

    pub fn count(&self) -> usize {
        self.entries.count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry lengths including subframe headers and padding.
    pub fn byte_len(&self) -> u64 {
        self.entries.byte_len()
    }

    /// Length on air: container MAC header plus entries.
    pub fn wire_len(&self) -> u64 {
        let header = if self.is_mesh() {
            MESH_HEADER_LEN
        } else {
            DATA_HEADER_LEN + if self.header.with_snap { SNAP_HEADER_LEN } else { 0 }
        };
        header + self.byte_len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataUnit> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{UnitKind, SUBFRAME_HEADER_LEN};

    fn unit(len: usize) -> DataUnit {
        DataUnit::zeroed(DataHeader::new(MacAddress::local(2), MacAddress::local(1)), len)
    }

    #[test]
    fn push_back_pads_previous_last() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        c.push_back(unit(5)).unwrap();
        assert_eq!(c.byte_len(), SUBFRAME_HEADER_LEN + 5);
        c.push_back(unit(7)).unwrap();
        // 19 -> 20, then 21 unpadded at the end
        assert_eq!(c.get(0).unwrap().byte_len(), 20);
        assert_eq!(c.get(1).unwrap().byte_len(), 21);
        assert_eq!(c.byte_len(), 41);
    }

    #[test]
    fn non_last_entries_are_aligned() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        for len in [1, 2, 3, 4, 5, 17] {
            c.push_back(unit(len)).unwrap();
        }
        let n = c.count();
        for (i, e) in c.iter().enumerate() {
            if i + 1 < n {
                assert_eq!(e.byte_len() % 4, 0);
            }
        }
        assert_eq!(c.byte_len(), c.iter().map(|e| e.byte_len()).sum::<u64>());
    }

    #[test]
    fn duplicate_is_rejected_without_effect() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        let u = unit(10);
        c.push_back(u.clone()).unwrap();
        let before = c.byte_len();
        assert!(matches!(c.push_back(u.clone()), Err(MacError::DuplicateEntry { .. })));
        assert!(matches!(c.push_front(u), Err(MacError::DuplicateEntry { .. })));
        assert_eq!(c.count(), 1);
        assert_eq!(c.byte_len(), before);
    }

    #[test]
    fn pop_back_returns_original_unit() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        c.push_back(unit(33)).unwrap();
        let u = unit(9);
        let before = c.byte_len();
        c.push_back(u.clone()).unwrap();
        let popped = c.pop_back().unwrap().unwrap();
        assert_eq!(popped, u);
        assert_eq!(popped.kind(), UnitKind::Plain);
        // the first entry keeps its padding
        assert_eq!(c.byte_len(), padded_len(before));
    }

    #[test]
    fn empty_pops_yield_none() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        assert!(c.pop_back().unwrap().is_none());
        assert!(c.pop_front().unwrap().is_none());
        assert!(c.remove(3).unwrap().is_none());
        assert_eq!(c.byte_len(), 0);
    }

    #[test]
    fn push_front_pads_new_front() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        c.push_back(unit(3)).unwrap();
        c.push_front(unit(3)).unwrap();
        assert_eq!(c.get(0).unwrap().byte_len(), 20);
        assert_eq!(c.get(1).unwrap().byte_len(), 17);
        assert_eq!(c.byte_len(), 37);
    }

    #[test]
    fn wire_len_adds_container_header() {
        let mut c = AggregateContainer::new(unit(0).header().clone());
        c.push_back(unit(100)).unwrap();
        assert_eq!(c.wire_len(), DATA_HEADER_LEN + SNAP_HEADER_LEN + SUBFRAME_HEADER_LEN + 100);
    }
}
