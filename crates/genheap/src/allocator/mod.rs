//! Allocator Module - Memory Allocation Strategies
//!
//! Manages the spaces objects are allocated in.
//!
//! ## Allocation Strategies
//!
//! - **Bump Pointer Allocation**: O(1) allocation in Gen0, and placement of
//!   survivors in Gen1/Gen2 during compaction
//! - **Large Object Allocation**: first-fit free lists for objects at or
//!   above `loh_threshold`
//! - **Generational Promotion**: survivors age one generation per cycle
//!
//! ## Spaces
//!
//! - Gen0: small, capped, collected most often
//! - Gen1: buffer between young and old
//! - Gen2: full-heap tier
//! - LOH: large objects, collected with Gen2

pub mod bump;
pub mod generational;
pub mod large;

pub use bump::GenerationSpace;
pub use generational::{PromotionPolicy, PromotionStats};
pub use large::LargeObjectSpace;

use crate::config::GcConfig;
use crate::error::{invariant_failed, Result};
use crate::heap::segment::Segment;
use crate::object::{Address, Generation};

/// HeapSpaces - every space of one heap
///
/// Routes payload access to the segment holding an address, whichever
/// space it belongs to.
pub struct HeapSpaces {
    gens: [GenerationSpace; 3],
    loh: LargeObjectSpace,
}

impl HeapSpaces {
    /// Map the initial segments described by `config`
    pub fn new(config: &GcConfig) -> Result<Self> {
        Ok(Self {
            gens: [
                GenerationSpace::new(
                    Generation::Gen0,
                    config.gen0_segment_size,
                    Some(config.gen0_max_size),
                )?,
                GenerationSpace::new(Generation::Gen1, config.gen1_segment_size, None)?,
                GenerationSpace::new(Generation::Gen2, config.gen2_segment_size, None)?,
            ],
            loh: LargeObjectSpace::new(config.loh_segment_size),
        })
    }

    /// Small-object space by index (0, 1, 2)
    pub fn gen(&self, index: usize) -> &GenerationSpace {
        &self.gens[index]
    }

    /// Small-object space by index, mutably
    pub fn gen_mut(&mut self, index: usize) -> &mut GenerationSpace {
        &mut self.gens[index]
    }

    /// Gen0 space
    pub fn gen0(&self) -> &GenerationSpace {
        &self.gens[0]
    }

    /// Gen0 space, mutably
    pub fn gen0_mut(&mut self) -> &mut GenerationSpace {
        &mut self.gens[0]
    }

    /// Large object space
    pub fn loh(&self) -> &LargeObjectSpace {
        &self.loh
    }

    /// Large object space, mutably
    pub fn loh_mut(&mut self) -> &mut LargeObjectSpace {
        &mut self.loh
    }

    /// Committed bytes across all spaces
    pub fn committed(&self) -> usize {
        self.gens.iter().map(GenerationSpace::committed).sum::<usize>() + self.loh.committed()
    }

    /// Space physically holding `addr`
    ///
    /// Differs from the object's generation tag for pinned survivors that
    /// were promoted in place.
    pub fn resident_space(&self, addr: Address) -> Option<Generation> {
        self.gens
            .iter()
            .find(|space| space.contains(addr))
            .map(GenerationSpace::generation)
            .or_else(|| self.loh.contains(addr).then_some(Generation::Large))
    }

    /// Segment holding `addr`
    pub fn segment_of(&self, addr: Address) -> Option<&Segment> {
        self.gens
            .iter()
            .find_map(|space| space.segment_of(addr))
            .or_else(|| self.loh.segment_of(addr))
    }

    fn segment_of_mut(&mut self, addr: Address) -> Option<&mut Segment> {
        if let Some(index) = self.gens.iter().position(|space| space.contains(addr)) {
            return self.gens[index].segment_of_mut(addr);
        }
        self.loh.segment_of_mut(addr)
    }

    /// Borrow `len` payload bytes at `addr`
    pub fn bytes(&self, addr: Address, len: usize) -> &[u8] {
        match self.segment_of(addr) {
            Some(segment) => segment.bytes(addr, len),
            None => invariant_failed("segment_of(addr).is_some()", format!("{:#x} is not mapped", addr)),
        }
    }

    /// Mutably borrow `len` payload bytes at `addr`
    pub fn bytes_mut(&mut self, addr: Address, len: usize) -> &mut [u8] {
        match self.segment_of_mut(addr) {
            Some(segment) => segment.bytes_mut(addr, len),
            None => invariant_failed("segment_of(addr).is_some()", format!("{:#x} is not mapped", addr)),
        }
    }

    /// Read the reference word at `addr`
    pub fn read_word(&self, addr: Address) -> Address {
        match self.segment_of(addr) {
            Some(segment) => segment.read_word(addr) as Address,
            None => invariant_failed("segment_of(addr).is_some()", format!("{:#x} is not mapped", addr)),
        }
    }

    /// Write the reference word at `addr`
    pub fn write_word(&mut self, addr: Address, value: Address) {
        match self.segment_of_mut(addr) {
            Some(segment) => segment.write_word(addr, value as u64),
            None => invariant_failed("segment_of(addr).is_some()", format!("{:#x} is not mapped", addr)),
        }
    }
}
