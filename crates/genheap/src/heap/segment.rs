//! Segment - Memory-mapped region with a bump cursor
//!
//! A segment is one anonymous mapping owned by a generation space or the
//! large object heap. Small-object spaces allocate by bumping `cursor`;
//! objects that must not move during compaction are registered as
//! obstacles and the cursor skips over them.
//!
//! ```text
//! base                                                   base + capacity
//! ┌──────────┬──────┬──────────┬────────┬──────────────────────┐
//! │  objects │ PIN  │ objects  │ cursor │        free          │
//! └──────────┴──────┴──────────┴────────┴──────────────────────┘
//!                ^ obstacle
//! ```
//!
//! Invariant: `cursor <= capacity`. Bytes below `high_water` may hold stale
//! data; every allocation zeroes its payload.

use crate::error::{GcError, Result};
use crate::heap::page::align_to_page;
use crate::object::Address;
use memmap2::{MmapMut, MmapOptions};

/// Segment - one mapped region
pub struct Segment {
    /// Backing mapping
    map: MmapMut,

    /// Base address of the mapping
    base: Address,

    /// Size of the mapping in bytes
    capacity: usize,

    /// Bump cursor (offset from base)
    cursor: usize,

    /// Highest cursor ever reached
    high_water: usize,

    /// Fixed residents (offset, length), sorted by offset
    obstacles: Vec<(usize, usize)>,

    /// First obstacle not yet passed by the cursor
    next_obstacle: usize,
}

impl Segment {
    /// Map a new zeroed segment of at least `size` bytes
    ///
    /// The size is rounded up to whole pages.
    pub fn map(size: usize) -> Result<Self> {
        let capacity = align_to_page(size.max(1));

        let mut map = MmapOptions::new().len(capacity).map_anon().map_err(|e| {
            GcError::VirtualMemory(format!("failed to map {} byte segment: {}", capacity, e))
        })?;

        let base = map.as_mut_ptr() as Address;
        log::trace!("mapped segment {:#x} ({} bytes)", base, capacity);

        Ok(Self {
            map,
            base,
            capacity,
            cursor: 0,
            high_water: 0,
            obstacles: Vec::new(),
            next_obstacle: 0,
        })
    }

    /// Base address
    #[inline]
    pub fn base(&self) -> Address {
        self.base
    }

    /// Capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bump cursor as an offset from base
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Highest cursor reached since mapping
    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Check if address lies in this segment
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.base && addr < self.base + self.capacity
    }

    /// Check if the cursor is at base and nothing is fixed in place
    pub fn is_empty(&self) -> bool {
        self.cursor == 0 && self.obstacles.is_empty()
    }

    /// Bytes still available to the bump cursor
    pub fn free_bytes(&self) -> usize {
        let blocked: usize = self.obstacles[self.next_obstacle..]
            .iter()
            .map(|&(off, len)| {
                let end = off + len;
                if end <= self.cursor {
                    0
                } else {
                    end - off.max(self.cursor)
                }
            })
            .sum();
        self.capacity - self.cursor - blocked
    }

    /// Bytes in use below the cursor, obstacles beyond it included
    pub fn used_bytes(&self) -> usize {
        self.capacity - self.free_bytes()
    }

    /// Fixed residents as (address, length)
    pub fn obstacles(&self) -> impl Iterator<Item = (Address, usize)> + '_ {
        self.obstacles
            .iter()
            .map(move |&(off, len)| (self.base + off, len))
    }

    /// Reset the cursor to base, keeping `obstacles` in place
    ///
    /// Obstacles are (address, length) pairs inside this segment.
    pub fn reset(&mut self, obstacles: Vec<(Address, usize)>) {
        let mut offsets: Vec<(usize, usize)> = obstacles
            .into_iter()
            .map(|(addr, len)| (addr - self.base, len))
            .collect();
        offsets.sort_unstable();

        for pair in offsets.windows(2) {
            crate::heap_invariant!(
                pair[0].0 + pair[0].1 <= pair[1].0,
                "overlapping obstacles in segment {:#x}",
                self.base
            );
        }

        self.obstacles = offsets;
        self.next_obstacle = 0;
        self.cursor = 0;
    }

    /// Reserve `size` bytes without touching their contents
    ///
    /// Used by the compaction planner, whose destinations may still hold
    /// payloads that have not been copied yet.
    pub fn reserve(&mut self, size: usize) -> Option<Address> {
        let (cursor, next_obstacle) = (self.cursor, self.next_obstacle);
        let reserved = self.bump(size);
        if reserved.is_none() {
            // A failed request must not strand the gaps it skipped
            self.cursor = cursor;
            self.next_obstacle = next_obstacle;
        }
        reserved
    }

    fn bump(&mut self, size: usize) -> Option<Address> {
        loop {
            // Obstacles entirely behind the cursor are passed
            while let Some(&(off, len)) = self.obstacles.get(self.next_obstacle) {
                if off + len <= self.cursor {
                    self.next_obstacle += 1;
                } else {
                    break;
                }
            }

            let start = self.cursor;
            let end = start.checked_add(size)?;

            if let Some(&(off, len)) = self.obstacles.get(self.next_obstacle) {
                if end > off {
                    self.cursor = self.cursor.max(off + len);
                    self.next_obstacle += 1;
                    continue;
                }
            }

            if end > self.capacity {
                return None;
            }

            self.cursor = end;
            self.high_water = self.high_water.max(end);
            return Some(self.base + start);
        }
    }

    /// Bump-allocate `size` zeroed bytes
    pub fn allocate(&mut self, size: usize) -> Option<Address> {
        let addr = self.reserve(size)?;
        self.bytes_mut(addr, size).fill(0);
        Some(addr)
    }

    /// Borrow `len` bytes at `addr`
    pub fn bytes(&self, addr: Address, len: usize) -> &[u8] {
        let off = self.offset_of(addr, len);
        &self.map[off..off + len]
    }

    /// Mutably borrow `len` bytes at `addr`
    pub fn bytes_mut(&mut self, addr: Address, len: usize) -> &mut [u8] {
        let off = self.offset_of(addr, len);
        &mut self.map[off..off + len]
    }

    /// Read a little-endian reference word
    pub fn read_word(&self, addr: Address) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.bytes(addr, 8));
        u64::from_le_bytes(word)
    }

    /// Write a little-endian reference word
    pub fn write_word(&mut self, addr: Address, value: u64) {
        self.bytes_mut(addr, 8).copy_from_slice(&value.to_le_bytes());
    }

    fn offset_of(&self, addr: Address, len: usize) -> usize {
        crate::heap_invariant!(
            addr >= self.base && addr + len <= self.base + self.capacity,
            "access {:#x}+{} outside segment {:#x}",
            addr,
            len,
            self.base
        );
        addr - self.base
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base", &format_args!("{:#x}", self.base))
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("high_water", &self.high_water)
            .field("obstacles", &self.obstacles.len())
            .finish()
    }
}
