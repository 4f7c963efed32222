//! Allocator Submodule - Bump Pointer Generation Spaces
//!
//! A generation space is a list of segments allocated by pointer bumping.
//! The fast path is a single cursor increment in the current segment; when
//! it fails the next segment is tried, and only then does the caller decide
//! between collecting and growing.

use crate::error::Result;
use crate::heap::segment::Segment;
use crate::object::{Address, Generation};

/// GenerationSpace - segment list for one small-object generation
pub struct GenerationSpace {
    generation: Generation,
    segments: Vec<Segment>,
    segment_size: usize,
    /// Growth cap for mutator-driven growth; `None` means limited only by
    /// the heap-wide budget
    max_size: Option<usize>,
    /// Segment the bump cursor currently works in
    current: usize,
}

impl GenerationSpace {
    /// Create a space with one mapped segment
    pub fn new(generation: Generation, segment_size: usize, max_size: Option<usize>) -> Result<Self> {
        let first = Segment::map(segment_size)?;
        Ok(Self {
            generation,
            segments: vec![first],
            segment_size,
            max_size,
            current: 0,
        })
    }

    /// Generation served by this space
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Nominal segment size
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Bump-allocate `size` zeroed bytes
    pub fn allocate(&mut self, size: usize) -> Option<Address> {
        while self.current < self.segments.len() {
            if let Some(addr) = self.segments[self.current].allocate(size) {
                return Some(addr);
            }
            if self.current + 1 == self.segments.len() {
                break;
            }
            self.current += 1;
        }
        None
    }

    /// Reserve `size` bytes without zeroing, for compaction planning
    pub fn reserve(&mut self, size: usize) -> Option<Address> {
        while self.current < self.segments.len() {
            if let Some(addr) = self.segments[self.current].reserve(size) {
                return Some(addr);
            }
            if self.current + 1 == self.segments.len() {
                break;
            }
            self.current += 1;
        }
        None
    }

    /// Whether mutator-driven growth by one segment stays within the cap
    pub fn can_grow(&self, heap_committed: usize, max_heap_size: usize) -> bool {
        let within_cap = self
            .max_size
            .map_or(true, |cap| self.committed() + self.segment_size <= cap);
        within_cap && heap_committed + self.segment_size <= max_heap_size
    }

    /// Bytes this space may still grow by before hitting its cap
    pub fn growth_headroom(&self, heap_committed: usize, max_heap_size: usize) -> usize {
        let heap_room = max_heap_size.saturating_sub(heap_committed);
        let room = match self.max_size {
            Some(cap) => cap.saturating_sub(self.committed()).min(heap_room),
            None => heap_room,
        };
        room - room % self.segment_size
    }

    /// Map one more segment of at least `min_size` bytes
    ///
    /// Returns the mapped size. Cap checks are the caller's concern.
    pub fn grow(&mut self, min_size: usize) -> Result<usize> {
        let segment = Segment::map(self.segment_size.max(min_size))?;
        let mapped = segment.capacity();
        self.segments.push(segment);
        if self.segments[self.current].free_bytes() == 0 {
            self.current = self.segments.len() - 1;
        }
        Ok(mapped)
    }

    /// Whether the space is above its growth cap
    pub fn over_cap(&self) -> bool {
        self.max_size.map_or(false, |cap| self.committed() > cap)
    }

    /// Reserve `size` bytes, growing past the cap if needed
    ///
    /// Compaction destinations must always accept survivors. Returns the
    /// address and the size of any segment mapped on the way.
    pub fn reserve_or_grow(&mut self, size: usize) -> Result<(Address, Option<usize>)> {
        if let Some(addr) = self.reserve(size) {
            return Ok((addr, None));
        }
        let mapped = self.grow(size)?;
        self.current = self.segments.len() - 1;
        match self.segments[self.current].reserve(size) {
            Some(addr) => Ok((addr, Some(mapped))),
            None => crate::error::invariant_failed(
                "segment.reserve(size).is_some()",
                format!("fresh {} segment cannot hold {} bytes", self.generation, size),
            ),
        }
    }

    /// Reset every segment, keeping `obstacles` in place
    ///
    /// Obstacles are (address, length) pairs; each is routed to the segment
    /// that contains it.
    pub fn reset(&mut self, obstacles: &[(Address, usize)]) {
        for segment in self.segments.iter_mut() {
            let fixed: Vec<(Address, usize)> = obstacles
                .iter()
                .copied()
                .filter(|&(addr, _)| segment.contains(addr))
                .collect();
            segment.reset(fixed);
        }
        self.current = 0;
    }

    /// Unmap trailing segments that hold nothing, keeping at least one
    ///
    /// Returns the number of bytes released.
    pub fn release_empty(&mut self) -> usize {
        let mut released = 0;
        while self.segments.len() > 1 {
            let last = self.segments.len() - 1;
            if !self.segments[last].is_empty() || self.current == last {
                break;
            }
            if let Some(segment) = self.segments.pop() {
                released += segment.capacity();
            }
        }
        released
    }

    /// Committed bytes
    pub fn committed(&self) -> usize {
        self.segments.iter().map(Segment::capacity).sum()
    }

    /// Bytes in use (allocated or fixed)
    pub fn used(&self) -> usize {
        self.segments.iter().map(Segment::used_bytes).sum()
    }

    /// Bytes still reachable by the bump cursor
    pub fn free_bytes(&self) -> usize {
        self.segments[self.current..]
            .iter()
            .map(Segment::free_bytes)
            .sum()
    }

    /// Check if address lies in this space
    pub fn contains(&self, addr: Address) -> bool {
        self.segments.iter().any(|segment| segment.contains(addr))
    }

    /// Segment containing `addr`
    pub fn segment_of(&self, addr: Address) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.contains(addr))
    }

    /// Segment containing `addr`, mutably
    pub fn segment_of_mut(&mut self, addr: Address) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|segment| segment.contains(addr))
    }

    /// All segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}
