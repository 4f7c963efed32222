//! Object Module - GC-managed object model
//!
//! This module defines the metadata the collector keeps per object and the
//! capability it needs from the embedder to find references.

pub mod descriptor;
pub mod header;
pub mod weak;

pub use descriptor::{LayoutTable, SlotLayout, TypeDescriptor};
pub use header::{
    align_size, Address, GcGeneration, Generation, ObjectHeader, TypeTag, OBJECT_ALIGNMENT,
    REFERENCE_SIZE,
};
pub use weak::{WeakHandle, WeakReferenceEntry, WeakTable};

use crate::relocate::RelocationMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Side table of object headers, ordered by address
///
/// Address order lets the collector enumerate the residents of a segment
/// with a range query and plan compaction in ascending address order.
#[derive(Debug, Default)]
pub struct ObjectTable {
    headers: BTreeMap<Address, ObjectHeader>,
}

impl ObjectTable {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, returning the one it replaced
    pub fn insert(&mut self, address: Address, header: ObjectHeader) -> Option<ObjectHeader> {
        self.headers.insert(address, header)
    }

    /// Header of the object at `address`
    #[inline]
    pub fn get(&self, address: Address) -> Option<&ObjectHeader> {
        self.headers.get(&address)
    }

    /// Mutable header of the object at `address`
    #[inline]
    pub fn get_mut(&mut self, address: Address) -> Option<&mut ObjectHeader> {
        self.headers.get_mut(&address)
    }

    /// Remove a header
    pub fn remove(&mut self, address: Address) -> Option<ObjectHeader> {
        self.headers.remove(&address)
    }

    /// Check if `address` names an object
    #[inline]
    pub fn contains(&self, address: Address) -> bool {
        self.headers.contains_key(&address)
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// All objects in address order
    pub fn iter(&self) -> impl Iterator<Item = (Address, &ObjectHeader)> + '_ {
        self.headers.iter().map(|(&addr, header)| (addr, header))
    }

    /// All objects in address order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Address, &mut ObjectHeader)> + '_ {
        self.headers.iter_mut().map(|(&addr, header)| (addr, header))
    }

    /// Objects whose address lies in `range`
    pub fn range(&self, range: Range<Address>) -> impl Iterator<Item = (Address, &ObjectHeader)> + '_ {
        self.headers.range(range).map(|(&addr, header)| (addr, header))
    }

    /// Addresses of condemned objects in `scope`, ascending
    pub fn condemned(&self, scope: GcGeneration) -> Vec<Address> {
        self.iter()
            .filter(|(_, header)| scope.condemns(header.generation))
            .map(|(addr, _)| addr)
            .collect()
    }

    /// Rekey every moved header and clear its forwarding pointer
    ///
    /// All moved headers are lifted out before any is reinserted, so an object
    /// may land on the old address of another object that moved away.
    pub fn relocate(&mut self, map: &RelocationMap) {
        let moved: Vec<(Address, ObjectHeader)> = map
            .iter()
            .filter_map(|(old, new)| {
                self.headers.remove(&old).map(|mut header| {
                    header.forwarding = None;
                    (new, header)
                })
            })
            .collect();

        for (new, header) in moved {
            let displaced = self.headers.insert(new, header);
            crate::heap_invariant!(
                displaced.is_none(),
                "object moved onto live object at {:#x}",
                new
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(generation: Generation) -> ObjectHeader {
        ObjectHeader::new(16, generation, TypeTag::LEAF, false)
    }

    #[test]
    fn test_condemned_filters_by_scope() {
        let mut table = ObjectTable::new();
        table.insert(0x3000, header(Generation::Gen0));
        table.insert(0x1000, header(Generation::Gen1));
        table.insert(0x2000, header(Generation::Large));

        assert_eq!(table.condemned(GcGeneration::Gen0), vec![0x3000]);
        assert_eq!(table.condemned(GcGeneration::Gen1), vec![0x1000, 0x3000]);
        assert_eq!(table.condemned(GcGeneration::Gen2).len(), 3);
    }

    #[test]
    fn test_range_and_relocate() {
        let mut table = ObjectTable::new();
        table.insert(0x1000, header(Generation::Gen0));
        table.insert(0x1010, header(Generation::Gen0));
        table.insert(0x9000, header(Generation::Gen0));

        assert_eq!(table.range(0x1000..0x2000).count(), 2);

        let mut map = RelocationMap::new();
        map.insert(0x9000, 0x1020);
        table.relocate(&map);
        assert!(table.contains(0x1020));
        assert!(!table.contains(0x9000));
        assert_eq!(table.range(0x1000..0x2000).count(), 3);
    }

    #[test]
    fn test_relocate_onto_vacated_address() {
        let mut table = ObjectTable::new();
        table.insert(0x1000, header(Generation::Gen0));
        table.insert(0x2000, header(Generation::Gen0));

        let mut map = RelocationMap::new();
        map.insert(0x1000, 0x5000);
        map.insert(0x2000, 0x1000);
        table.relocate(&map);
        assert!(table.contains(0x1000));
        assert!(table.contains(0x5000));
        assert!(!table.contains(0x2000));
    }

    #[test]
    #[should_panic(expected = "heap invariant violated")]
    fn test_relocate_onto_live_object_panics() {
        let mut table = ObjectTable::new();
        table.insert(0x1000, header(Generation::Gen0));
        table.insert(0x2000, header(Generation::Gen0));
        let mut map = RelocationMap::new();
        map.insert(0x2000, 0x1000);
        table.relocate(&map);
    }
}
