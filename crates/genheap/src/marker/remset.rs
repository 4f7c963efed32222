//! Remembered Set and Dirty Set - Write barrier bookkeeping
//!
//! Remembered set: objects in older generations that may hold references
//! into younger ones. A partial collection scans them as extra roots, so it
//! never has to trace the uncondemned part of the heap.
//!
//! Dirty set: objects that received a reference store after the background
//! marker had already scanned them. The marker re-scans them before it
//! finishes, so no store made during marking is missed.

use crate::allocator::HeapSpaces;
use crate::object::{Address, GcGeneration, Generation, ObjectTable, TypeDescriptor};
use crate::relocate::RelocationMap;
use crossbeam_deque::{Injector, Steal};
use std::collections::BTreeSet;

/// Whether a store of `target` into `source` must be remembered
#[inline]
pub fn needs_remembering(source: Generation, target: Generation) -> bool {
    source.age() > target.age()
}

/// RememberedSet - old-to-young reference sources
#[derive(Debug, Default)]
pub struct RememberedSet {
    sources: BTreeSet<Address>,
}

impl RememberedSet {
    /// Create empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a source object
    pub fn record(&mut self, source: Address) {
        self.sources.insert(source);
    }

    /// Check if an object is recorded
    pub fn contains(&self, source: Address) -> bool {
        self.sources.contains(&source)
    }

    /// Number of recorded sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Recorded sources in address order
    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        self.sources.iter().copied()
    }

    /// Sources outside `scope`, scanned as extra roots
    pub fn seeds(&self, objects: &ObjectTable, scope: GcGeneration) -> Vec<Address> {
        self.sources
            .iter()
            .copied()
            .filter(|&src| {
                objects
                    .get(src)
                    .map_or(false, |header| !scope.condemns(header.generation))
            })
            .collect()
    }

    /// Rewrite sources that moved
    pub fn relocate(&mut self, map: &RelocationMap) {
        if map.is_empty() {
            return;
        }
        self.sources = self.sources.iter().map(|&src| map.forward(src)).collect();
    }

    /// Recompute membership for the current members plus `candidates`
    ///
    /// Called after promotion, when survivors may have become older than
    /// the objects they reference. Returns the new size of the set.
    pub fn refresh(
        &mut self,
        objects: &ObjectTable,
        spaces: &HeapSpaces,
        types: &dyn TypeDescriptor,
        candidates: impl IntoIterator<Item = Address>,
    ) -> usize {
        let mut check: BTreeSet<Address> = std::mem::take(&mut self.sources);
        check.extend(candidates);

        for src in check {
            let Some(header) = objects.get(src) else {
                continue;
            };
            let offsets = types.reference_offsets(header.type_tag, header.size());
            let remembered = offsets.iter().any(|&off| {
                let target = spaces.read_word(src + off);
                target != 0
                    && objects
                        .get(target)
                        .map_or(false, |t| needs_remembering(header.generation, t.generation))
            });
            if remembered {
                self.sources.insert(src);
            }
        }

        self.sources.len()
    }
}

/// DirtySet - objects stored into after being marked
///
/// Append-only while marking runs; drained by the marker.
#[derive(Debug, Default)]
pub struct DirtySet {
    queue: Injector<Address>,
}

impl DirtySet {
    /// Create empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dirty object
    pub fn push(&self, object: Address) {
        self.queue.push(object);
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Take every pending entry
    pub fn drain(&self) -> Vec<Address> {
        let mut drained = Vec::with_capacity(self.queue.len());
        loop {
            match self.queue.steal() {
                Steal::Success(object) => drained.push(object),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
        drained
    }

    /// Rewrite pending entries that moved
    pub fn relocate(&self, map: &RelocationMap) {
        for object in self.drain() {
            self.queue.push(map.forward(object));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GcConfig, KB};
    use crate::object::{LayoutTable, ObjectHeader, SlotLayout, TypeTag};

    #[test]
    fn test_needs_remembering() {
        assert!(needs_remembering(Generation::Gen1, Generation::Gen0));
        assert!(needs_remembering(Generation::Large, Generation::Gen1));
        assert!(!needs_remembering(Generation::Gen0, Generation::Gen2));
        assert!(!needs_remembering(Generation::Gen2, Generation::Large));
    }

    #[test]
    fn test_seeds_exclude_condemned_sources() {
        let mut objects = ObjectTable::new();
        objects.insert(0x1000, ObjectHeader::new(8, Generation::Gen1, TypeTag::LEAF, false));
        objects.insert(0x2000, ObjectHeader::new(8, Generation::Gen2, TypeTag::LEAF, false));

        let mut remset = RememberedSet::new();
        remset.record(0x1000);
        remset.record(0x2000);

        assert_eq!(remset.seeds(&objects, GcGeneration::Gen0), vec![0x1000, 0x2000]);
        assert_eq!(remset.seeds(&objects, GcGeneration::Gen1), vec![0x2000]);
        assert!(remset.seeds(&objects, GcGeneration::Gen2).is_empty());
    }

    #[test]
    fn test_refresh_keeps_only_old_to_young() {
        let config = GcConfig {
            gen0_segment_size: 64 * KB,
            gen1_segment_size: 64 * KB,
            gen2_segment_size: 64 * KB,
            ..Default::default()
        };
        let mut spaces = HeapSpaces::new(&config).unwrap();
        let mut layouts = LayoutTable::new();
        layouts.register(TypeTag(1), SlotLayout::Fixed(vec![0]));

        let young = spaces.gen0_mut().allocate(8).unwrap();
        let old = spaces.gen_mut(2).allocate(8).unwrap();
        let peer = spaces.gen_mut(2).allocate(8).unwrap();
        spaces.write_word(old, young);
        spaces.write_word(peer, old);

        let mut objects = ObjectTable::new();
        objects.insert(young, ObjectHeader::new(8, Generation::Gen0, TypeTag(1), false));
        objects.insert(old, ObjectHeader::new(8, Generation::Gen2, TypeTag(1), false));
        objects.insert(peer, ObjectHeader::new(8, Generation::Gen2, TypeTag(1), false));

        let mut remset = RememberedSet::new();
        remset.record(peer);
        assert_eq!(remset.refresh(&objects, &spaces, &layouts, [old]), 1);
        assert!(remset.contains(old));
        assert!(!remset.contains(peer));
    }

    #[test]
    fn test_dirty_set_drain_and_relocate() {
        let dirty = DirtySet::new();
        dirty.push(0x1000);
        dirty.push(0x2000);

        let mut map = RelocationMap::new();
        map.insert(0x1000, 0x8000);
        dirty.relocate(&map);

        let mut drained = dirty.drain();
        drained.sort_unstable();
        assert_eq!(drained, vec![0x2000, 0x8000]);
        assert!(dirty.is_empty());
    }
}
