//! Compaction - Survivor placement
//!
//! Decides where every movable survivor of a cycle goes. Survivors are
//! placed in ascending original-address order into the space of the
//! generation they are promoted to, so the surviving part of each space ends
//! up densely packed at its start.
//!
//! Spaces inside the collection scope are reset before placement; residents
//! that will not move (pinned objects, objects waiting for their finalizer,
//! and uncondemned objects promoted in place earlier) are kept as obstacles
//! the bump cursor skips. Spaces outside the scope are appended to.
//!
//! The plan is recorded as forwarding pointers in the headers and as a
//! [`RelocationMap`]; nothing is copied here.

use crate::allocator::{HeapSpaces, PromotionPolicy};
use crate::error::Result;
use crate::object::{Address, GcGeneration, Generation, ObjectTable};
use crate::relocate::RelocationMap;
use std::collections::BTreeSet;

/// Outcome of planning one compaction
#[derive(Debug, Default)]
pub struct CompactionPlan {
    /// Every planned move
    pub map: RelocationMap,
    /// Bytes that will be copied
    pub moved_bytes: usize,
    /// Segments mapped to hold survivors (generation, mapped bytes)
    pub grown: Vec<(Generation, usize)>,
    /// Large objects moved by the one-shot LOH compaction
    pub large_moves: usize,
}

/// Compactor - plans survivor placement for one cycle
#[derive(Debug, Default, Clone, Copy)]
pub struct Compactor {
    policy: PromotionPolicy,
}

impl Compactor {
    /// Create compactor
    pub fn new(policy: PromotionPolicy) -> Self {
        Self { policy }
    }

    /// Plan the placement of every condemned survivor
    ///
    /// Must run after garbage headers were removed, so every header in
    /// `objects` is live. `fixed` holds objects that must stay where they are
    /// besides pinned ones. LOH objects only move when `compact_loh` is set
    /// for a Gen2 scope.
    pub fn plan(
        &self,
        spaces: &mut HeapSpaces,
        objects: &mut ObjectTable,
        scope: GcGeneration,
        fixed: &BTreeSet<Address>,
        compact_loh: bool,
    ) -> Result<CompactionPlan> {
        let mut plan = CompactionPlan::default();

        let movable: Vec<(Address, usize, usize)> = objects
            .iter()
            .filter(|(addr, header)| {
                scope.condemns(header.generation)
                    && !header.is_large()
                    && !header.is_pinned()
                    && !fixed.contains(addr)
            })
            .filter_map(|(addr, header)| {
                self.policy
                    .target(header.generation)
                    .space_index()
                    .map(|target| (addr, header.size(), target))
            })
            .collect();
        let moving: BTreeSet<Address> = movable.iter().map(|&(addr, _, _)| addr).collect();

        for index in 0..=scope.index() {
            let space_generation = spaces.gen(index).generation();
            let obstacles: Vec<(Address, usize)> = objects
                .iter()
                .filter(|(addr, _)| !moving.contains(addr))
                .filter(|(addr, _)| spaces.resident_space(*addr) == Some(space_generation))
                .map(|(addr, header)| (addr, header.size()))
                .collect();
            log::trace!(
                "resetting {} space with {} obstacles",
                space_generation,
                obstacles.len()
            );
            spaces.gen_mut(index).reset(&obstacles);
        }

        for &(old, size, target) in &movable {
            let space = spaces.gen_mut(target);
            let (new, mapped) = space.reserve_or_grow(size)?;
            if let Some(bytes) = mapped {
                plan.grown.push((space.generation(), bytes));
            }
            if new != old {
                if let Some(header) = objects.get_mut(old) {
                    header.forwarding = Some(new);
                }
                plan.map.insert(old, new);
                plan.moved_bytes += size;
            }
        }

        if compact_loh && scope == GcGeneration::Gen2 {
            let large: Vec<(Address, usize, bool)> = objects
                .iter()
                .filter(|(_, header)| header.is_large())
                .map(|(addr, header)| (addr, header.size(), header.is_pinned() || fixed.contains(&addr)))
                .collect();
            for (old, new) in spaces.loh_mut().plan_compaction(&large) {
                if let Some(header) = objects.get_mut(old) {
                    header.forwarding = Some(new);
                    plan.moved_bytes += header.size();
                }
                plan.map.insert(old, new);
                plan.large_moves += 1;
            }
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GcConfig, KB};
    use crate::object::{ObjectHeader, TypeTag};

    fn setup() -> (HeapSpaces, ObjectTable) {
        let config = GcConfig {
            gen0_segment_size: 64 * KB,
            gen1_segment_size: 64 * KB,
            gen2_segment_size: 64 * KB,
            loh_segment_size: 256 * KB,
            loh_threshold: 8 * KB,
            ..Default::default()
        };
        (HeapSpaces::new(&config).unwrap(), ObjectTable::new())
    }

    fn alloc(spaces: &mut HeapSpaces, objects: &mut ObjectTable, index: usize, size: usize) -> Address {
        let addr = spaces.gen_mut(index).allocate(size).unwrap();
        let generation = spaces.gen(index).generation();
        objects.insert(addr, ObjectHeader::new(size as u32, generation, TypeTag::LEAF, false));
        addr
    }

    #[test]
    fn test_gen0_survivors_move_to_gen1() {
        let (mut spaces, mut objects) = setup();
        let a = alloc(&mut spaces, &mut objects, 0, 32);
        let b = alloc(&mut spaces, &mut objects, 0, 16);
        let gen1_base = spaces.gen(1).segments()[0].base();

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen0, &BTreeSet::new(), false)
            .unwrap();

        assert_eq!(plan.map.get(a), Some(gen1_base));
        assert_eq!(plan.map.get(b), Some(gen1_base + 32));
        assert_eq!(objects.get(a).unwrap().forwarding, Some(gen1_base));
        assert_eq!(plan.moved_bytes, 48);
        assert_eq!(spaces.gen0().used(), 0);
    }

    #[test]
    fn test_pinned_and_fixed_stay_as_obstacles() {
        let (mut spaces, mut objects) = setup();
        let pinned = alloc(&mut spaces, &mut objects, 0, 64);
        let pending = alloc(&mut spaces, &mut objects, 0, 64);
        let movable = alloc(&mut spaces, &mut objects, 0, 64);
        objects.get_mut(pinned).unwrap().pin_count = 1;
        let fixed: BTreeSet<Address> = [pending].into_iter().collect();

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen0, &fixed, false)
            .unwrap();

        assert_eq!(plan.map.len(), 1);
        assert!(plan.map.get(movable).is_some());
        assert_eq!(spaces.gen0().used(), 128);
        let next = spaces.gen0_mut().allocate(8).unwrap();
        assert_eq!(next, movable);
    }

    #[test]
    fn test_gen2_slides_in_place() {
        let (mut spaces, mut objects) = setup();
        let dead = alloc(&mut spaces, &mut objects, 2, 32);
        let live = alloc(&mut spaces, &mut objects, 2, 32);
        objects.remove(dead);

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen2, &BTreeSet::new(), false)
            .unwrap();

        assert_eq!(plan.map.get(live), Some(dead));
    }

    #[test]
    fn test_uncondemned_space_is_appended() {
        let (mut spaces, mut objects) = setup();
        let old = alloc(&mut spaces, &mut objects, 1, 32);
        let young = alloc(&mut spaces, &mut objects, 0, 16);

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen0, &BTreeSet::new(), false)
            .unwrap();

        assert_eq!(plan.map.get(old), None);
        assert_eq!(plan.map.get(young), Some(old + 32));
    }

    #[test]
    fn test_loh_moves_only_when_requested() {
        let (mut spaces, mut objects) = setup();
        spaces.loh_mut().grow(64 * KB).unwrap();
        let first = spaces.loh_mut().allocate(16 * KB).unwrap();
        let second = spaces.loh_mut().allocate(16 * KB).unwrap();
        objects.insert(second, ObjectHeader::new(16 * KB as u32, Generation::Large, TypeTag::LEAF, false));
        spaces.loh_mut().free(first, 16 * KB);

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen2, &BTreeSet::new(), false)
            .unwrap();
        assert!(plan.map.is_empty());

        let plan = Compactor::default()
            .plan(&mut spaces, &mut objects, GcGeneration::Gen2, &BTreeSet::new(), true)
            .unwrap();
        assert_eq!(plan.map.get(second), Some(first));
        assert_eq!(plan.large_moves, 1);
    }
}
