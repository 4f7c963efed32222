//! GC Stress Tests - Randomized Graph Mutation
//!
//! A seeded random mutator builds, rewires, pins and drops PAIR graphs while
//! collections of every scope run in between. After each collection the set
//! of reachable ids must be exactly what it was before, and the heap must
//! pass verification.
//!
//! The mutator never holds an address across a call that may allocate; it
//! re-derives addresses from the roots instead.

mod common;

use common::{small_config, HeapFixture, MB};
use genheap::{Address, GcConfig, GcGeneration, Heap, RootHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const ROOTS: usize = 16;
const STEPS: usize = 4000;

struct Mutator {
    fixture: HeapFixture,
    rng: StdRng,
    roots: Vec<RootHandle>,
    pinned: Vec<(RootHandle, Address)>,
    next_id: u64,
    collections: usize,
}

impl Mutator {
    fn new(seed: u64, config: GcConfig) -> Self {
        let fixture = HeapFixture::with_config(config);
        let roots = (0..ROOTS).map(|_| fixture.root(0)).collect();
        Self {
            fixture,
            rng: StdRng::seed_from_u64(seed),
            roots,
            pinned: Vec::new(),
            next_id: 0,
            collections: 0,
        }
    }

    /// Random walk from a random root
    fn random_node(&mut self) -> Option<Address> {
        let handle = self.roots[self.rng.gen_range(0..self.roots.len())];
        let mut node = self.fixture.roots.get(handle)?;
        for _ in 0..self.rng.gen_range(0..6) {
            let slot = self.rng.gen_range(0..2) * 8;
            match self.fixture.heap.read_reference(node, slot).ok()? {
                0 => break,
                next => node = next,
            }
        }
        Some(node)
    }

    fn random_root(&mut self) -> RootHandle {
        self.roots[self.rng.gen_range(0..self.roots.len())]
    }

    fn step(&mut self) -> anyhow::Result<()> {
        match self.rng.gen_range(0..100) {
            // Attach a fresh node
            0..=39 => {
                let fresh = self.fixture.pair(self.next_id);
                self.next_id += 1;
                match self.random_node() {
                    Some(target) if self.rng.gen_bool(0.7) => {
                        let slot = self.rng.gen_range(0..2) * 8;
                        self.fixture.heap.write_reference(target, slot, fresh)?;
                    },
                    _ => {
                        let root = self.random_root();
                        self.fixture.roots.set(root, fresh);
                    },
                }
            },
            // Rewire an edge, possibly into a cycle
            40..=64 => {
                if let Some(source) = self.random_node() {
                    let target = if self.rng.gen_bool(0.2) {
                        0
                    } else {
                        self.random_node().unwrap_or(0)
                    };
                    let slot = self.rng.gen_range(0..2) * 8;
                    self.fixture.heap.write_reference(source, slot, target)?;
                }
            },
            // Drop a root
            65..=72 => {
                let root = self.random_root();
                self.fixture.roots.set(root, 0);
            },
            // Garbage, occasionally large
            73..=82 => {
                let size = if self.rng.gen_bool(0.05) {
                    self.rng.gen_range(85_000..300_000)
                } else {
                    self.rng.gen_range(8..256)
                };
                self.fixture.heap.allocate(size)?;
            },
            // Pin a reachable node and keep it alive
            83..=87 => {
                if let Some(node) = self.random_node() {
                    if self.fixture.heap.pin(node).is_ok() {
                        let handle = self.fixture.root(node);
                        self.pinned.push((handle, node));
                    }
                }
            },
            // Release a pin
            88..=91 => {
                if !self.pinned.is_empty() {
                    let index = self.rng.gen_range(0..self.pinned.len());
                    let (handle, addr) = self.pinned.swap_remove(index);
                    assert_eq!(self.fixture.resolve(handle), addr, "pinned object moved");
                    self.fixture.heap.unpin(addr)?;
                    self.fixture.roots.remove(handle);
                }
            },
            // Collect
            _ => {
                let scope = match self.rng.gen_range(0..10) {
                    0..=5 => GcGeneration::Gen0,
                    6..=8 => GcGeneration::Gen1,
                    _ => GcGeneration::Gen2,
                };
                self.collect_and_check(scope)?;
            },
        }
        Ok(())
    }

    fn collect_and_check(&mut self, scope: GcGeneration) -> anyhow::Result<()> {
        let before = self.fixture.reachable_ids();
        let report = self.fixture.heap.collect(scope)?;
        let after = self.fixture.reachable_ids();
        assert_eq!(
            before, after,
            "cycle {} ({}) changed the reachable set",
            report.cycle, scope
        );

        self.collections += 1;
        if self.collections % 8 == 0 {
            self.fixture.heap.verify_heap();
        }
        Ok(())
    }

    fn run(&mut self, steps: usize) -> anyhow::Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        self.collect_and_check(GcGeneration::Gen2)?;
        self.fixture.heap.verify_heap();
        Ok(())
    }
}

/// ============================================================================
/// RANDOMIZED MUTATION
/// ============================================================================

/// Reachability is preserved across thousands of random mutations
///
/// **Bug this finds:** Missed remembered-set entries, stale slots after
/// compaction, pinned objects treated as movable
#[test]
fn test_random_graph_mutation() -> anyhow::Result<()> {
    for seed in [1u64, 7, 42] {
        let mut mutator = Mutator::new(seed, small_config());
        mutator.run(STEPS)?;
        assert!(mutator.collections > 0, "seed {} never collected", seed);
    }
    Ok(())
}

/// Same workload on a tight heap, where allocation-triggered collections
/// and Gen1 escalation dominate
#[test]
fn test_random_graph_mutation_tight_heap() -> anyhow::Result<()> {
    let config = GcConfig {
        gen0_segment_size: 16 * 1024,
        gen0_max_size: 64 * 1024,
        gen1_segment_size: 32 * 1024,
        gen2_segment_size: 64 * 1024,
        loh_threshold: 8 * 1024,
        loh_segment_size: MB,
        gen1_survivor_threshold: 2 * 1024,
        gen2_trigger_bytes: 256 * 1024,
        loh_trigger_bytes: MB,
        ..small_config()
    };
    let mut mutator = Mutator::new(99, config);
    mutator.run(STEPS)?;
    assert!(mutator.fixture.heap.collection_count(GcGeneration::Gen0) > 0);
    Ok(())
}

/// ============================================================================
/// CONCURRENT ALLOCATION
/// ============================================================================

/// Many threads allocating at once never corrupt the heap
#[test]
fn test_concurrent_allocation() {
    let fixture = HeapFixture::new();
    let heap: Arc<Heap> = Arc::new(fixture.heap);

    let workers: Vec<_> = (0..4)
        .map(|seed| {
            let heap = heap.clone();
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..5000 {
                    let size = rng.gen_range(8..512);
                    heap.allocate(size).expect("allocation failed");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    heap.verify_heap();
    assert_eq!(heap.gc_summary().allocated_objects, 20_000);
    heap.collect(GcGeneration::Gen2).unwrap();
    assert_eq!(heap.object_count(), 0);
}
