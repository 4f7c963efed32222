//! Relocation Map - Address Mapping During Compaction
//!
//! Maps old object addresses to the new addresses planned by the compactor.
//! The map is built once per cycle, handed to every component that holds
//! addresses (roots, weak table, finalization queue, remembered set) and
//! dropped when compaction completes.
//!
//! Usage:
//! 1. Planner inserts one entry per moved object
//! 2. Reference slots, roots and tables are rewritten through `forward`
//! 3. Payloads are copied and headers rekeyed

use crate::object::Address;
use indexmap::IndexMap;

/// RelocationMap - old address to new address
///
/// Insertion order is planning order (ascending original address).
/// Addresses without an entry did not move.
#[derive(Debug, Clone, Default)]
pub struct RelocationMap {
    entries: IndexMap<Address, Address>,
}

impl RelocationMap {
    /// Create empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a move
    ///
    /// Identity moves are not recorded.
    pub fn insert(&mut self, old: Address, new: Address) {
        if old != new {
            self.entries.insert(old, new);
        }
    }

    /// New address of a moved object
    #[inline]
    pub fn get(&self, old: Address) -> Option<Address> {
        self.entries.get(&old).copied()
    }

    /// Address after relocation, `old` itself if it did not move
    ///
    /// The null reference forwards to itself.
    #[inline]
    pub fn forward(&self, old: Address) -> Address {
        self.get(old).unwrap_or(old)
    }

    /// Number of moved objects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing moved
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves in planning order
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.entries.iter().map(|(&old, &new)| (old, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward() {
        let mut map = RelocationMap::new();
        map.insert(0x1000, 0x2000);
        assert_eq!(map.forward(0x1000), 0x2000);
        assert_eq!(map.forward(0x1008), 0x1008);
        assert_eq!(map.forward(0), 0);
    }

    #[test]
    fn test_identity_not_recorded() {
        let mut map = RelocationMap::new();
        map.insert(0x1000, 0x1000);
        assert!(map.is_empty());
    }

    #[test]
    fn test_iteration_keeps_planning_order() {
        let mut map = RelocationMap::new();
        map.insert(0x3000, 0x100);
        map.insert(0x1000, 0x200);
        let moves: Vec<_> = map.iter().collect();
        assert_eq!(moves, vec![(0x3000, 0x100), (0x1000, 0x200)]);
    }
}
