//! Relocate Module - Object Relocation & Compaction
//!
//! Relocation moves survivors so that each space is densely packed and Gen0
//! can keep allocating by pointer bumping.
//!
//! Relocation Strategy (stop-the-world):
//! 1. Plan new addresses and record forwarding pointers
//! 2. Rewrite every reference slot that points at a moved object
//! 3. Rewrite roots and the collector's own tables
//! 4. Copy payloads
//! 5. Rekey headers and clear forwarding pointers
//!
//! Slots are rewritten at the old locations, before anything is copied.
//! Payloads are snapshotted before any is written, so moves may overlap
//! each other and cross segment boundaries.

pub mod compaction;
pub mod forwarding;

pub use compaction::{CompactionPlan, Compactor};
pub use forwarding::RelocationMap;

use crate::allocator::HeapSpaces;
use crate::object::{Address, ObjectTable, TypeDescriptor};
use std::collections::BTreeSet;

/// Copy statistics of one relocation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelocationStats {
    /// Objects moved
    pub objects_moved: usize,
    /// Bytes copied
    pub bytes_moved: usize,
    /// Reference slots rewritten
    pub slots_rewritten: usize,
}

/// Rewrite the reference slots of `owners` through `map`
///
/// Owners are pre-move addresses; each is visited once so a slot is never
/// forwarded twice. Returns the number of slots rewritten.
pub fn rewrite_references(
    spaces: &mut HeapSpaces,
    objects: &ObjectTable,
    types: &dyn TypeDescriptor,
    owners: &BTreeSet<Address>,
    map: &RelocationMap,
) -> usize {
    if map.is_empty() {
        return 0;
    }

    let mut rewritten = 0;
    for &owner in owners {
        let Some(header) = objects.get(owner) else {
            continue;
        };
        let offsets = types.reference_offsets(header.type_tag, header.size());
        for &off in offsets.iter() {
            let slot = owner + off;
            let target = spaces.read_word(slot);
            if let Some(new) = map.get(target) {
                spaces.write_word(slot, new);
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Copy the payload of every planned move and rekey the headers
///
/// Leaves no forwarding pointer behind; a surviving one is fatal.
pub fn move_objects(
    spaces: &mut HeapSpaces,
    objects: &mut ObjectTable,
    map: &RelocationMap,
) -> RelocationStats {
    let mut stats = RelocationStats::default();

    let payloads: Vec<(Address, Vec<u8>)> = map
        .iter()
        .filter_map(|(old, new)| {
            objects
                .get(old)
                .map(|header| (new, spaces.bytes(old, header.size()).to_vec()))
        })
        .collect();

    for (new, payload) in payloads {
        spaces.bytes_mut(new, payload.len()).copy_from_slice(&payload);
        stats.objects_moved += 1;
        stats.bytes_moved += payload.len();
    }

    objects.relocate(map);

    let stale = objects
        .iter()
        .find(|(_, header)| header.forwarding.is_some())
        .map(|(addr, _)| addr);
    crate::heap_invariant!(
        stale.is_none(),
        "forwarding pointer survived compaction at {:#x}",
        stale.unwrap_or(0)
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GcConfig, KB};
    use crate::object::{Generation, LayoutTable, ObjectHeader, SlotLayout, TypeTag};

    const PAIR: TypeTag = TypeTag(7);

    fn spaces() -> HeapSpaces {
        let config = GcConfig {
            gen0_segment_size: 64 * KB,
            gen1_segment_size: 64 * KB,
            gen2_segment_size: 64 * KB,
            ..Default::default()
        };
        HeapSpaces::new(&config).unwrap()
    }

    #[test]
    fn test_rewrite_then_move() {
        let mut spaces = spaces();
        let mut layouts = LayoutTable::new();
        layouts.register(PAIR, SlotLayout::Fixed(vec![0]));

        let holder = spaces.gen_mut(2).allocate(16).unwrap();
        let target = spaces.gen0_mut().allocate(16).unwrap();
        spaces.write_word(holder, target);
        spaces.bytes_mut(target + 8, 4).copy_from_slice(b"data");

        let mut objects = ObjectTable::new();
        objects.insert(holder, ObjectHeader::new(16, Generation::Gen2, PAIR, false));
        let mut header = ObjectHeader::new(16, Generation::Gen0, PAIR, false);
        let destination = spaces.gen_mut(1).reserve(16).unwrap();
        header.forwarding = Some(destination);
        objects.insert(target, header);

        let mut map = RelocationMap::new();
        map.insert(target, destination);

        let owners: BTreeSet<Address> = [holder, target].into_iter().collect();
        assert_eq!(rewrite_references(&mut spaces, &objects, &layouts, &owners, &map), 1);
        assert_eq!(spaces.read_word(holder), destination);

        let stats = move_objects(&mut spaces, &mut objects, &map);
        assert_eq!(stats.objects_moved, 1);
        assert_eq!(spaces.bytes(destination + 8, 4), b"data");
        assert!(objects.contains(destination));
        assert!(!objects.contains(target));
        assert!(objects.get(destination).unwrap().forwarding.is_none());
    }

    #[test]
    fn test_overlapping_slide() {
        let mut spaces = spaces();
        let a = spaces.gen0_mut().allocate(16).unwrap();
        let b = spaces.gen0_mut().allocate(16).unwrap();
        let c = spaces.gen0_mut().allocate(16).unwrap();
        spaces.bytes_mut(b, 16).fill(0xbb);
        spaces.bytes_mut(c, 16).fill(0xcc);

        let mut objects = ObjectTable::new();
        objects.insert(b, ObjectHeader::new(16, Generation::Gen0, TypeTag::LEAF, false));
        objects.insert(c, ObjectHeader::new(16, Generation::Gen0, TypeTag::LEAF, false));

        let mut map = RelocationMap::new();
        map.insert(b, a);
        map.insert(c, b);
        move_objects(&mut spaces, &mut objects, &map);

        assert!(spaces.bytes(a, 16).iter().all(|&x| x == 0xbb));
        assert!(spaces.bytes(b, 16).iter().all(|&x| x == 0xcc));
        assert!(objects.contains(a) && objects.contains(b) && !objects.contains(c));
    }
}
