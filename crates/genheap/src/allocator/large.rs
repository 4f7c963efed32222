//! Large Object Allocator
//!
//! Allocator for objects at or above the large object threshold.
//! Bump allocation would waste space on these, and copying them is
//! expensive, so they live on a separate free-list managed heap.
//!
//! Characteristics of large objects:
//! - Size >= `loh_threshold` (default 85,000 bytes)
//! - Rarely allocated
//! - Often long-lived
//!
//! Strategy:
//! - One address-ordered free list per segment
//! - First fit; the remainder is split back into the list
//! - Frees coalesce with both neighbours
//! - Objects never move, except through an explicitly requested
//!   compaction during a Gen2 collection

use crate::error::Result;
use crate::heap::segment::Segment;
use crate::object::Address;
use std::collections::BTreeMap;

/// One large object segment and its free list
struct LohSegment {
    segment: Segment,
    /// offset -> length, ordered and disjoint
    free: BTreeMap<usize, usize>,
}

impl LohSegment {
    fn new(segment: Segment) -> Self {
        let mut free = BTreeMap::new();
        free.insert(0, segment.capacity());
        Self { segment, free }
    }

    fn free_bytes(&self) -> usize {
        self.free.values().sum()
    }

    fn first_fit(&mut self, size: usize) -> Option<usize> {
        let (&off, &len) = self.free.iter().find(|(_, &len)| len >= size)?;
        self.free.remove(&off);
        if len > size {
            self.free.insert(off + size, len - size);
        }
        Some(off)
    }

    fn release(&mut self, off: usize, len: usize) {
        let mut start = off;
        let mut length = len;

        if let Some((&prev_off, &prev_len)) = self.free.range(..off).next_back() {
            crate::heap_invariant!(
                prev_off + prev_len <= off,
                "LOH free entry {:#x}+{} overlaps freed block {:#x}",
                self.segment.base() + prev_off,
                prev_len,
                self.segment.base() + off
            );
            if prev_off + prev_len == off {
                self.free.remove(&prev_off);
                start = prev_off;
                length += prev_len;
            }
        }

        if let Some((&next_off, &next_len)) = self.free.range(off..).next() {
            crate::heap_invariant!(
                off + len <= next_off,
                "freed block {:#x}+{} overlaps LOH free entry {:#x}",
                self.segment.base() + off,
                len,
                self.segment.base() + next_off
            );
            if off + len == next_off {
                self.free.remove(&next_off);
                length += next_len;
            }
        }

        self.free.insert(start, length);
    }

    /// Rebuild the free list as the complement of `occupied` (sorted offsets)
    fn rebuild(&mut self, occupied: &[(usize, usize)]) {
        self.free.clear();
        let mut cursor = 0;
        for &(off, len) in occupied {
            if off > cursor {
                self.free.insert(cursor, off - cursor);
            }
            cursor = cursor.max(off + len);
        }
        if cursor < self.segment.capacity() {
            self.free.insert(cursor, self.segment.capacity() - cursor);
        }
    }
}

/// LargeObjectSpace - free-list allocator for large objects
///
/// Segments are mapped lazily, at least `segment_size` bytes each.
pub struct LargeObjectSpace {
    segments: Vec<LohSegment>,
    segment_size: usize,
}

impl LargeObjectSpace {
    /// Create an empty large object space
    pub fn new(segment_size: usize) -> Self {
        Self {
            segments: Vec::new(),
            segment_size,
        }
    }

    /// First-fit allocate `size` zeroed bytes
    pub fn allocate(&mut self, size: usize) -> Option<Address> {
        for loh in self.segments.iter_mut() {
            if let Some(off) = loh.first_fit(size) {
                let addr = loh.segment.base() + off;
                loh.segment.bytes_mut(addr, size).fill(0);
                return Some(addr);
            }
        }
        None
    }

    /// Bytes a new segment for a `size` byte object would map
    pub fn growth_size(&self, size: usize) -> usize {
        crate::heap::page::align_to_page(self.segment_size.max(size))
    }

    /// Map a new segment able to hold at least `size` bytes
    ///
    /// Returns the mapped size.
    pub fn grow(&mut self, size: usize) -> Result<usize> {
        let segment = Segment::map(self.segment_size.max(size))?;
        let mapped = segment.capacity();
        self.segments.push(LohSegment::new(segment));
        Ok(mapped)
    }

    /// Return a dead object's block to its segment's free list
    pub fn free(&mut self, addr: Address, size: usize) {
        let loh = self
            .segments
            .iter_mut()
            .find(|loh| loh.segment.contains(addr));
        crate::heap_invariant!(loh.is_some(), "free of {:#x} outside the LOH", addr);
        if let Some(loh) = loh {
            let off = addr - loh.segment.base();
            loh.release(off, size);
        }
    }

    /// Unmap segments with nothing allocated in them
    ///
    /// Returns the number of bytes released.
    pub fn release_empty(&mut self) -> usize {
        let mut released = 0;
        self.segments.retain(|loh| {
            let empty = loh.free_bytes() == loh.segment.capacity();
            if empty {
                released += loh.segment.capacity();
            }
            !empty
        });
        released
    }

    /// Plan a sliding compaction of every LOH segment
    ///
    /// `objects` lists every live large object as (address, size, pinned),
    /// in ascending address order. Movable objects slide towards the start of
    /// their own segment, skipping pinned ones. Free lists are rebuilt for the
    /// planned layout; payloads are moved by the caller. Returns the moves.
    pub fn plan_compaction(&mut self, objects: &[(Address, usize, bool)]) -> Vec<(Address, Address)> {
        let mut moves = Vec::new();

        for loh in self.segments.iter_mut() {
            let base = loh.segment.base();
            let residents: Vec<(usize, usize, bool)> = objects
                .iter()
                .filter(|(addr, _, _)| loh.segment.contains(*addr))
                .map(|&(addr, size, pinned)| (addr - base, size, pinned))
                .collect();

            let pinned: Vec<(usize, usize)> = residents
                .iter()
                .filter(|(_, _, pinned)| *pinned)
                .map(|&(off, size, _)| (off, size))
                .collect();

            let mut occupied = pinned.clone();
            let mut cursor = 0;
            for &(off, size, is_pinned) in &residents {
                if is_pinned {
                    continue;
                }
                while let Some(&(p_off, p_len)) = pinned
                    .iter()
                    .find(|&&(p_off, p_len)| p_off < cursor + size && cursor < p_off + p_len)
                {
                    cursor = p_off + p_len;
                }
                crate::heap_invariant!(
                    cursor <= off,
                    "LOH compaction moved {:#x} forwards",
                    base + off
                );
                if cursor != off {
                    moves.push((base + off, base + cursor));
                }
                occupied.push((cursor, size));
                cursor += size;
            }

            occupied.sort_unstable();
            loh.rebuild(&occupied);
        }

        moves
    }

    /// Check free lists are ordered, disjoint and inside their segments
    pub fn verify(&self) {
        for loh in &self.segments {
            let mut end = 0;
            for (&off, &len) in &loh.free {
                crate::heap_invariant!(
                    len > 0 && off >= end && off + len <= loh.segment.capacity(),
                    "corrupt LOH free list in segment {:#x}",
                    loh.segment.base()
                );
                crate::heap_invariant!(
                    off > end || end == 0,
                    "uncoalesced LOH free entries at {:#x}",
                    loh.segment.base() + off
                );
                end = off + len;
            }
        }
    }

    /// Committed bytes
    pub fn committed(&self) -> usize {
        self.segments.iter().map(|loh| loh.segment.capacity()).sum()
    }

    /// Free bytes across all free lists
    pub fn free_bytes(&self) -> usize {
        self.segments.iter().map(LohSegment::free_bytes).sum()
    }

    /// Largest single free block
    pub fn largest_free_block(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|loh| loh.free.values().copied())
            .max()
            .unwrap_or(0)
    }

    /// Number of free list entries
    pub fn free_entries(&self) -> usize {
        self.segments.iter().map(|loh| loh.free.len()).sum()
    }

    /// Number of mapped segments
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Check if address lies in the LOH
    pub fn contains(&self, addr: Address) -> bool {
        self.segment_of(addr).is_some()
    }

    /// Segment containing `addr`
    pub fn segment_of(&self, addr: Address) -> Option<&Segment> {
        self.segments
            .iter()
            .map(|loh| &loh.segment)
            .find(|segment| segment.contains(addr))
    }

    /// Segment containing `addr`, mutably
    pub fn segment_of_mut(&mut self, addr: Address) -> Option<&mut Segment> {
        self.segments
            .iter_mut()
            .map(|loh| &mut loh.segment)
            .find(|segment| segment.contains(addr))
    }
}
