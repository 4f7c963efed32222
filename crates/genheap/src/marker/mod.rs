//! Marker Module - Reachability Tracing
//!
//! This module identifies which condemned objects are still reachable.
//!
//! Marking Algorithm:
//! - Tri-color marking (White = unmarked, Grey = on the mark stack,
//!   Black = marked and scanned)
//! - Explicit mark stack, no recursion, so deep graphs cannot overflow
//! - Cycles terminate through the mark bit
//!
//! Marking Sources:
//! 1. Roots from the [`RootProvider`]
//! 2. Remembered-set sources outside the collection scope
//! 3. Dirty objects recorded by the write barrier during background marking
//! 4. Objects waiting for their finalizer, after real roots are done
//!
//! Objects outside the collection scope are never marked; references out of
//! them are covered by the remembered set.

pub mod mark_stack;
pub mod remset;
pub mod roots;

pub use mark_stack::MarkStack;
pub use remset::{needs_remembering, DirtySet, RememberedSet};
pub use roots::{RootHandle, RootProvider, RootTable, RootType};

use crate::allocator::HeapSpaces;
use crate::error::invariant_failed;
use crate::object::{Address, GcGeneration, ObjectTable, TypeDescriptor};

/// Statistics of one tracing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Objects newly marked
    pub marked_objects: usize,
    /// Bytes newly marked
    pub marked_bytes: usize,
    /// Objects whose slots were scanned
    pub scanned_objects: usize,
    /// Reference slots read
    pub scanned_slots: usize,
}

impl TraceStats {
    /// Add another pass's counters
    pub fn merge(&mut self, other: TraceStats) {
        self.marked_objects += other.marked_objects;
        self.marked_bytes += other.marked_bytes;
        self.scanned_objects += other.scanned_objects;
        self.scanned_slots += other.scanned_slots;
    }
}

/// Tracer - marks everything reachable inside a collection scope
///
/// Borrows the heap's tables for the duration of one pass. The mark stack is
/// borrowed too, so background marking can resume where a quantum stopped.
pub struct Tracer<'a> {
    objects: &'a mut ObjectTable,
    spaces: &'a HeapSpaces,
    types: &'a dyn TypeDescriptor,
    stack: &'a mut MarkStack,
    scope: GcGeneration,
    stats: TraceStats,
}

impl<'a> Tracer<'a> {
    /// Create a tracer for `scope`
    pub fn new(
        objects: &'a mut ObjectTable,
        spaces: &'a HeapSpaces,
        types: &'a dyn TypeDescriptor,
        stack: &'a mut MarkStack,
        scope: GcGeneration,
    ) -> Self {
        Self {
            objects,
            spaces,
            types,
            stack,
            scope,
            stats: TraceStats::default(),
        }
    }

    /// Trace from roots and remembered-set seeds to completion
    pub fn trace(&mut self, roots: &[Address], seeds: &[Address]) -> TraceStats {
        for &root in roots {
            self.mark_root(root);
        }
        for &seed in seeds {
            self.scan(seed);
        }
        self.drain(None);
        self.stats
    }

    /// Mark a root
    ///
    /// Roots that do not name an object are skipped with a warning.
    pub fn mark_root(&mut self, root: Address) -> bool {
        if root == 0 {
            return false;
        }
        if !self.objects.contains(root) {
            log::warn!("root {:#x} does not name a live object, ignored", root);
            return false;
        }
        self.mark(root)
    }

    /// Mark a referenced object and queue it for scanning
    ///
    /// Returns true if the object was newly marked.
    pub fn mark(&mut self, addr: Address) -> bool {
        if addr == 0 {
            return false;
        }
        let scope = self.scope;
        let header = match self.objects.get_mut(addr) {
            Some(header) => header,
            None => invariant_failed(
                "objects.contains(addr)",
                format!("reference to {:#x} does not name an object", addr),
            ),
        };
        if header.mark || !scope.condemns(header.generation) {
            return false;
        }
        header.mark = true;
        self.stats.marked_objects += 1;
        self.stats.marked_bytes += header.size();
        self.stack.push(addr);
        true
    }

    /// Scan the slots of `addr`, marking what they reference
    ///
    /// Used directly for remembered-set seeds and dirty objects, which are
    /// scanned without being marked themselves.
    pub fn scan(&mut self, addr: Address) {
        let Some(header) = self.objects.get(addr) else {
            return;
        };
        let (tag, size) = (header.type_tag, header.size());
        let types = self.types;
        let offsets = types.reference_offsets(tag, size);

        self.stats.scanned_objects += 1;
        for &off in offsets.iter() {
            self.stats.scanned_slots += 1;
            let target = self.spaces.read_word(addr + off);
            self.mark(target);
        }
    }

    /// Scan grey objects until the stack is empty or `budget` objects were
    /// processed
    ///
    /// Returns true when the stack is empty.
    pub fn drain(&mut self, budget: Option<usize>) -> bool {
        let mut processed = 0;
        while budget.map_or(true, |limit| processed < limit) {
            match self.stack.pop() {
                Some(addr) => {
                    self.scan(addr);
                    processed += 1;
                }
                None => return true,
            }
        }
        self.stack.is_empty()
    }

    /// Counters of this pass so far
    pub fn stats(&self) -> TraceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GcConfig, KB};
    use crate::object::{Generation, LayoutTable, ObjectHeader, SlotLayout, TypeTag};

    const NODE: TypeTag = TypeTag(1);

    struct Fixture {
        spaces: HeapSpaces,
        objects: ObjectTable,
        layouts: LayoutTable,
    }

    impl Fixture {
        fn new() -> Self {
            let config = GcConfig {
                gen0_segment_size: 64 * KB,
                gen1_segment_size: 64 * KB,
                gen2_segment_size: 64 * KB,
                ..Default::default()
            };
            let mut layouts = LayoutTable::new();
            layouts.register(NODE, SlotLayout::Fixed(vec![0, 8]));
            Self {
                spaces: HeapSpaces::new(&config).unwrap(),
                objects: ObjectTable::new(),
                layouts,
            }
        }

        fn node(&mut self, generation: Generation) -> Address {
            let index = generation.space_index().unwrap();
            let addr = self.spaces.gen_mut(index).allocate(16).unwrap();
            self.objects
                .insert(addr, ObjectHeader::new(16, generation, NODE, false));
            addr
        }

        fn link(&mut self, from: Address, slot: usize, to: Address) {
            self.spaces.write_word(from + slot * 8, to);
        }

        fn trace(&mut self, scope: GcGeneration, roots: &[Address], seeds: &[Address]) -> TraceStats {
            let mut stack = MarkStack::new();
            let mut tracer = Tracer::new(
                &mut self.objects,
                &self.spaces,
                &self.layouts,
                &mut stack,
                scope,
            );
            tracer.trace(roots, seeds)
        }

        fn marked(&self, addr: Address) -> bool {
            self.objects.get(addr).unwrap().mark
        }
    }

    #[test]
    fn test_marks_reachable_chain() {
        let mut fx = Fixture::new();
        let a = fx.node(Generation::Gen0);
        let b = fx.node(Generation::Gen0);
        let c = fx.node(Generation::Gen0);
        let unreachable = fx.node(Generation::Gen0);
        fx.link(a, 0, b);
        fx.link(b, 1, c);

        let stats = fx.trace(GcGeneration::Gen0, &[a], &[]);
        assert_eq!(stats.marked_objects, 3);
        assert!(fx.marked(a) && fx.marked(b) && fx.marked(c));
        assert!(!fx.marked(unreachable));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut fx = Fixture::new();
        let a = fx.node(Generation::Gen0);
        let b = fx.node(Generation::Gen0);
        fx.link(a, 0, b);
        fx.link(b, 0, a);
        fx.link(a, 1, a);

        let stats = fx.trace(GcGeneration::Gen0, &[a, b], &[]);
        assert_eq!(stats.marked_objects, 2);
        assert_eq!(stats.scanned_objects, 2);
    }

    #[test]
    fn test_scope_stops_at_old_objects() {
        let mut fx = Fixture::new();
        let young = fx.node(Generation::Gen0);
        let old = fx.node(Generation::Gen2);
        let behind_old = fx.node(Generation::Gen0);
        fx.link(young, 0, old);
        fx.link(old, 0, behind_old);

        fx.trace(GcGeneration::Gen0, &[young], &[]);
        assert!(!fx.marked(old));
        assert!(!fx.marked(behind_old));
    }

    #[test]
    fn test_remembered_seed_keeps_young_alive() {
        let mut fx = Fixture::new();
        let old = fx.node(Generation::Gen1);
        let young = fx.node(Generation::Gen0);
        fx.link(old, 1, young);

        fx.trace(GcGeneration::Gen0, &[], &[old]);
        assert!(fx.marked(young));
        assert!(!fx.marked(old));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut fx = Fixture::new();
        let first = fx.node(Generation::Gen0);
        let mut prev = first;
        for _ in 0..2000 {
            let next = fx.node(Generation::Gen0);
            fx.link(prev, 0, next);
            prev = next;
        }
        let stats = fx.trace(GcGeneration::Gen0, &[first], &[]);
        assert_eq!(stats.marked_objects, 2001);
    }

    #[test]
    fn test_budgeted_drain() {
        let mut fx = Fixture::new();
        let a = fx.node(Generation::Gen0);
        let b = fx.node(Generation::Gen0);
        let c = fx.node(Generation::Gen0);
        fx.link(a, 0, b);
        fx.link(b, 0, c);

        let mut stack = MarkStack::new();
        let mut tracer = Tracer::new(
            &mut fx.objects,
            &fx.spaces,
            &fx.layouts,
            &mut stack,
            GcGeneration::Gen2,
        );
        tracer.mark_root(a);
        assert!(!tracer.drain(Some(1)));
        assert!(!tracer.drain(Some(1)));
        assert!(tracer.drain(Some(1)));
        assert_eq!(tracer.stats().marked_objects, 3);
    }

    #[test]
    fn test_unknown_root_ignored() {
        let mut fx = Fixture::new();
        let stats = fx.trace(GcGeneration::Gen0, &[0xdead_0000], &[]);
        assert_eq!(stats.marked_objects, 0);
    }
}
