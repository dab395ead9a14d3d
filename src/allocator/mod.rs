//! Frame allocation for the cartridge device
//!
//! Ownership of every frame slot is tracked in a single grid kept in scan
//! order. A file's frame chain has no explicit links: it is the sequence of
//! slots owned by the file, read in increasing (cartridge, frame) order.
//! New frames are always claimed *after* the file's current end slot, so the
//! chain order and the scan order can never disagree.

use crate::error::{CartError, Result};
use crate::file_table::FileHandle;
use crate::geometry::{FrameSlot, Geometry};
use tracing::{debug, error};

/// Ownership grid over all frame slots
#[derive(Debug, Clone)]
pub struct FrameMap {
    geometry: Geometry,
    /// Owner of each slot, indexed by scan position
    owners: Vec<Option<FileHandle>>,
    /// Number of unowned slots
    free_frames: usize,
}

impl FrameMap {
    pub fn new(geometry: Geometry) -> Self {
        FrameMap {
            geometry,
            owners: vec![None; geometry.total_frames()],
            free_frames: geometry.total_frames(),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn owner(&self, slot: FrameSlot) -> Option<FileHandle> {
        if !self.geometry.contains(slot) {
            return None;
        }
        self.owners[self.geometry.index_of(slot)]
    }

    /// Claim the first free slot on the device for `handle`
    pub fn allocate_first(&mut self, handle: FileHandle) -> Result<FrameSlot> {
        self.claim_from(handle, 0)
    }

    /// Claim the first free slot after `end` (the file's current end slot)
    ///
    /// The scan moves forward only, rolling over to frame 0 of the next
    /// cartridge. Free slots before `end` are never used, which keeps the
    /// new slot last in the file's chain.
    pub fn allocate_next(&mut self, handle: FileHandle, end: FrameSlot) -> Result<FrameSlot> {
        self.claim_from(handle, self.geometry.index_of(end) + 1)
    }

    fn claim_from(&mut self, handle: FileHandle, start: usize) -> Result<FrameSlot> {
        let Some(index) = self.position_from(start, |owner| owner.is_none()) else {
            debug!(%handle, "no free frame after scan position {}", start);
            return Err(CartError::Exhausted);
        };

        self.owners[index] = Some(handle);
        self.free_frames -= 1;
        let slot = self.geometry.slot_at(index);
        debug!(%handle, %slot, "allocated frame");
        Ok(slot)
    }

    /// Find the slot that follows `cursor` in `handle`'s chain
    ///
    /// Returns `Ok(None)` when `cursor` is the chain's `end` slot. A missing
    /// successor before the end is reported as chain corruption.
    pub fn next_owned(
        &self,
        handle: FileHandle,
        cursor: FrameSlot,
        end: FrameSlot,
    ) -> Result<Option<FrameSlot>> {
        if cursor == end {
            return Ok(None);
        }

        let start = self.geometry.index_of(cursor) + 1;
        match self.position_from(start, |owner| owner == Some(handle)) {
            Some(index) => Ok(Some(self.geometry.slot_at(index))),
            None => {
                error!(%handle, %cursor, %end, "frame chain ends before its end slot");
                Err(CartError::ChainCorruption {
                    handle: handle.0,
                    after: cursor,
                })
            }
        }
    }

    /// The `n`th slot (0-based) of `handle`'s chain
    pub fn nth_owned(&self, handle: FileHandle, n: usize) -> Option<FrameSlot> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| **owner == Some(handle))
            .nth(n)
            .map(|(index, _)| self.geometry.slot_at(index))
    }

    /// Every slot of `handle`'s chain, in chain order
    pub fn chain(&self, handle: FileHandle) -> Vec<FrameSlot> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| **owner == Some(handle))
            .map(|(index, _)| self.geometry.slot_at(index))
            .collect()
    }

    /// Release every slot owned by `handle`, returning how many were freed
    pub fn release(&mut self, handle: FileHandle) -> usize {
        let mut released = 0;
        for owner in self.owners.iter_mut().filter(|owner| **owner == Some(handle)) {
            *owner = None;
            released += 1;
        }
        self.free_frames += released;
        debug!(%handle, released, "released frames");
        released
    }

    /// Forget every owner
    pub fn clear(&mut self) {
        self.owners.fill(None);
        self.free_frames = self.geometry.total_frames();
    }

    pub fn total_frames(&self) -> usize {
        self.geometry.total_frames()
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    fn position_from<P>(&self, start: usize, predicate: P) -> Option<usize>
    where
        P: Fn(Option<FileHandle>) -> bool,
    {
        self.owners
            .get(start..)?
            .iter()
            .position(|owner| predicate(*owner))
            .map(|offset| start + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: FileHandle = FileHandle(0);
    const B: FileHandle = FileHandle(1);

    fn map(cartridges: usize, frames: usize) -> FrameMap {
        FrameMap::new(Geometry::new(cartridges, frames).unwrap())
    }

    #[test]
    fn test_allocate_first_scans_from_origin() {
        let mut map = map(2, 4);
        assert_eq!(map.allocate_first(A).unwrap(), FrameSlot::new(0, 0));
        assert_eq!(map.allocate_first(B).unwrap(), FrameSlot::new(0, 1));
        assert_eq!(map.free_frames(), 6);
        assert_eq!(map.owner(FrameSlot::new(0, 1)), Some(B));
    }

    #[test]
    fn test_allocate_next_rolls_over_cartridges() {
        let mut map = map(2, 2);
        let first = map.allocate_first(A).unwrap();
        let second = map.allocate_next(A, first).unwrap();
        let third = map.allocate_next(A, second).unwrap();
        assert_eq!(third, FrameSlot::new(1, 0));
        assert_eq!(map.chain(A), vec![first, second, third]);
    }

    #[test]
    fn test_allocate_next_skips_slots_before_end() {
        let mut map = map(1, 4);
        let a0 = map.allocate_first(A).unwrap();
        let b0 = map.allocate_first(B).unwrap();
        let a1 = map.allocate_next(A, b0).unwrap();
        map.release(B);
        // (0, 1) is free again but lies before A's end slot.
        let a2 = map.allocate_next(A, a1).unwrap();
        assert_eq!(map.chain(A), vec![a0, a1, a2]);
        assert!(matches!(map.allocate_next(A, a2), Err(CartError::Exhausted)));
        assert_eq!(map.free_frames(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let mut map = map(1, 2);
        map.allocate_first(A).unwrap();
        map.allocate_first(B).unwrap();
        assert!(matches!(map.allocate_first(A), Err(CartError::Exhausted)));
    }

    #[test]
    fn test_next_owned_walks_chain() {
        let mut map = map(2, 3);
        let a0 = map.allocate_first(A).unwrap();
        let b0 = map.allocate_first(B).unwrap();
        let a1 = map.allocate_next(A, b0).unwrap();

        assert_eq!(map.next_owned(A, a0, a1).unwrap(), Some(a1));
        assert_eq!(map.next_owned(A, a1, a1).unwrap(), None);
    }

    #[test]
    fn test_next_owned_reports_corruption() {
        let mut map = map(1, 4);
        let a0 = map.allocate_first(A).unwrap();
        let result = map.next_owned(A, a0, FrameSlot::new(0, 3));
        assert!(matches!(result, Err(CartError::ChainCorruption { .. })));
    }

    #[test]
    fn test_nth_owned() {
        let mut map = map(1, 8);
        let a0 = map.allocate_first(A).unwrap();
        let b0 = map.allocate_first(B).unwrap();
        let a1 = map.allocate_next(A, b0).unwrap();

        assert_eq!(map.nth_owned(A, 0), Some(a0));
        assert_eq!(map.nth_owned(A, 1), Some(a1));
        assert_eq!(map.nth_owned(A, 2), None);
    }

    #[test]
    fn test_release_frees_all_owned_slots() {
        let mut map = map(1, 8);
        let a0 = map.allocate_first(A).unwrap();
        map.allocate_next(A, a0).unwrap();
        map.allocate_first(B).unwrap();

        assert_eq!(map.release(A), 2);
        assert!(map.chain(A).is_empty());
        assert_eq!(map.free_frames(), 7);
        assert_eq!(map.allocate_first(A).unwrap(), FrameSlot::new(0, 0));
    }

    #[test]
    fn test_clear() {
        let mut map = map(1, 4);
        map.allocate_first(A).unwrap();
        map.clear();
        assert_eq!(map.free_frames(), 4);
        assert_eq!(map.owner(FrameSlot::new(0, 0)), None);
    }
}
