//! GC Correctness Tests - Reachability and Object Identity
//!
//! These tests verify the invariants every cycle must keep:
//! - Reachable objects survive, unreachable ones are reclaimed
//! - References and roots follow objects that move
//! - Pinned objects never move
//! - Generations only increase
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{HeapFixture, NODE, PAIR};
use genheap::{GcGeneration, Generation};

/// ============================================================================
/// RECLAMATION
/// ============================================================================

/// Unrooted Gen0 objects are all reclaimed by one Gen0 collection
///
/// **Bug this finds:** Leaked headers, spurious roots
/// **Invariant verified:** Nothing survives without a path from a root
#[test]
fn test_unrooted_gen0_objects_reclaimed() {
    let fixture = HeapFixture::new();
    fixture.allocate_many(1000, 64);
    assert_eq!(fixture.heap.object_count(), 1000);

    let before = fixture.heap.collection_count(GcGeneration::Gen0);
    let report = fixture.collect(GcGeneration::Gen0);

    assert_eq!(fixture.heap.collection_count(GcGeneration::Gen0), before + 1);
    assert_eq!(report.live_objects, 0);
    assert_eq!(report.reclaimed_objects, 1000);
    assert_eq!(report.reclaimed_bytes, 64_000);
    assert_eq!(fixture.heap.object_count(), 0);
    assert_eq!(fixture.heap.heap_stats().gen0_used, 0);
}

/// A collection with nothing to do changes nothing
///
/// **Bug this finds:** Compaction that shuffles an already compact heap
#[test]
fn test_repeated_collection_is_idempotent() {
    let fixture = HeapFixture::new();
    let handles: Vec<_> = (0..50).map(|i| fixture.root(fixture.pair(i))).collect();

    // Gen0 -> Gen1 -> Gen2: after three cycles everything sits in Gen2
    for _ in 0..3 {
        fixture.collect(GcGeneration::Gen2);
    }
    let addresses: Vec<_> = handles.iter().map(|&h| fixture.resolve(h)).collect();
    let stats = fixture.heap.heap_stats();

    let report = fixture.collect(GcGeneration::Gen2);
    assert_eq!(report.reclaimed_objects, 0);
    assert_eq!(report.relocated, 0);
    assert_eq!(report.promoted_bytes, 0);
    assert_eq!(report.live_objects, 50);

    let after: Vec<_> = handles.iter().map(|&h| fixture.resolve(h)).collect();
    assert_eq!(addresses, after);
    assert_eq!(fixture.heap.heap_stats(), stats);
    fixture.heap.verify_heap();
}

/// A rooted cycle survives; an unrooted one is reclaimed
#[test]
fn test_cycle_reachability() {
    let fixture = HeapFixture::new();
    let a = fixture.heap.allocate_object(16, NODE, false).unwrap();
    let b = fixture.heap.allocate_object(16, NODE, false).unwrap();
    fixture.heap.write_reference(a, 0, b).unwrap();
    fixture.heap.write_reference(b, 0, a).unwrap();
    let root = fixture.root(a);

    fixture.collect(GcGeneration::Gen0);
    fixture.collect(GcGeneration::Gen2);

    let a = fixture.resolve(root);
    let b = fixture.heap.read_reference(a, 0).unwrap();
    assert!(fixture.heap.contains(b));
    assert_eq!(fixture.heap.read_reference(b, 0).unwrap(), a);

    fixture.roots.remove(root);
    let report = fixture.collect(GcGeneration::Gen2);
    assert_eq!(report.reclaimed_objects, 2);
    assert_eq!(fixture.heap.object_count(), 0);
}

/// Payload bytes travel with the object
#[test]
fn test_payload_preserved_across_moves() {
    let fixture = HeapFixture::new();
    let mut handles = Vec::new();
    for i in 0..100u64 {
        handles.push(fixture.root(fixture.pair(i * 7)));
        // Garbage between survivors
        fixture.allocate(24);
    }

    for scope in [GcGeneration::Gen0, GcGeneration::Gen1, GcGeneration::Gen2] {
        let report = fixture.collect(scope);
        assert!(report.relocated > 0 || scope == GcGeneration::Gen2);
        for (i, &handle) in handles.iter().enumerate() {
            assert_eq!(fixture.id_of(fixture.resolve(handle)), i as u64 * 7);
        }
    }
    fixture.heap.verify_heap();
}

/// ============================================================================
/// GENERATIONS
/// ============================================================================

/// Survivors climb one generation per condemning collection and never fall
///
/// **Invariant verified:** Generation tags are monotonic
#[test]
fn test_generation_monotonicity() {
    let fixture = HeapFixture::new();
    let root = fixture.root(fixture.allocate(64));
    let generation = |f: &HeapFixture| f.heap.generation_of(f.resolve(root)).unwrap();

    assert_eq!(generation(&fixture), Generation::Gen0);

    fixture.collect(GcGeneration::Gen0);
    assert_eq!(generation(&fixture), Generation::Gen1);

    // Gen1 is not condemned by a Gen0 collection
    fixture.collect(GcGeneration::Gen0);
    assert_eq!(generation(&fixture), Generation::Gen1);

    fixture.collect(GcGeneration::Gen1);
    assert_eq!(generation(&fixture), Generation::Gen2);

    fixture.collect(GcGeneration::Gen0);
    fixture.collect(GcGeneration::Gen2);
    assert_eq!(generation(&fixture), Generation::Gen2);
}

/// An old object keeps a young one alive through the remembered set
///
/// **Bug this finds:** Missing write barrier, stale slot after the young
/// object moves
#[test]
fn test_old_to_young_reference_survives_young_collection() {
    let fixture = HeapFixture::new();
    let root = fixture.root(fixture.pair(1));
    fixture.collect(GcGeneration::Gen0);
    fixture.collect(GcGeneration::Gen1);
    let old = fixture.resolve(root);
    assert_eq!(fixture.heap.generation_of(old).unwrap(), Generation::Gen2);

    let young = fixture.pair(2);
    fixture.heap.write_reference(old, 0, young).unwrap();
    assert_eq!(fixture.heap.heap_stats().remembered_sources, 1);

    let report = fixture.collect(GcGeneration::Gen0);
    assert_eq!(report.live_objects, 1);
    assert_eq!(report.reclaimed_objects, 0);

    let young = fixture.heap.read_reference(old, 0).unwrap();
    assert!(fixture.heap.contains(young));
    assert_eq!(fixture.id_of(young), 2);
    assert_eq!(fixture.heap.generation_of(young).unwrap(), Generation::Gen1);
    fixture.heap.verify_heap();
}

/// ============================================================================
/// WEAK REFERENCES & PINNING
/// ============================================================================

/// A weak reference resolves while its target lives and clears after
#[test]
fn test_weak_reference_follows_and_clears() {
    let fixture = HeapFixture::new();
    let d = fixture.pair(4);
    let root = fixture.root(d);
    let weak = fixture.heap.register_weak_reference(d).unwrap();

    fixture.collect(GcGeneration::Gen0);
    let moved = fixture.resolve(root);
    assert_ne!(moved, d, "Gen0 survivors are promoted into Gen1 space");
    assert_eq!(fixture.heap.resolve_weak_reference(weak).unwrap(), Some(moved));

    fixture.roots.remove(root);
    let report = fixture.collect(GcGeneration::Gen1);
    assert_eq!(report.weak_cleared, 1);
    assert_eq!(fixture.heap.resolve_weak_reference(weak).unwrap(), None);

    fixture.heap.free_weak_reference(weak).unwrap();
    assert!(fixture.heap.resolve_weak_reference(weak).is_err());
}

/// A pinned object keeps its address while its neighbour moves
///
/// **Bug this finds:** Compaction sliding over pinned objects
#[test]
fn test_pinned_object_not_moved() {
    let fixture = HeapFixture::new();
    let a = fixture.pair(10);
    let b = fixture.pair(20);
    let root_a = fixture.root(a);
    let root_b = fixture.root(b);
    fixture.heap.pin(a).unwrap();

    fixture.collect(GcGeneration::Gen2);

    assert_eq!(fixture.resolve(root_a), a);
    assert_ne!(fixture.resolve(root_b), b);
    assert_eq!(fixture.id_of(a), 10);
    assert_eq!(fixture.id_of(fixture.resolve(root_b)), 20);
    // Promoted in metadata only
    assert_eq!(fixture.heap.generation_of(a).unwrap(), Generation::Gen1);
    assert!(fixture.heap.is_pinned(a).unwrap());
    fixture.heap.verify_heap();
}

/// References to a pinned object stay valid across cycles
#[test]
fn test_reference_to_pinned_object() {
    let fixture = HeapFixture::new();
    let holder = fixture.heap.allocate_object(24, PAIR, false).unwrap();
    let pinned = fixture.pair(5);
    fixture.heap.write_reference(holder, 8, pinned).unwrap();
    fixture.heap.pin(pinned).unwrap();
    let root = fixture.root(holder);

    fixture.collect(GcGeneration::Gen0);
    fixture.collect(GcGeneration::Gen2);

    let holder = fixture.resolve(root);
    assert_eq!(fixture.heap.read_reference(holder, 8).unwrap(), pinned);
    assert_eq!(fixture.heap.read_reference(holder, 0).unwrap(), 0);
}
