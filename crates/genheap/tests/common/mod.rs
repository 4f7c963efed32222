//! Test Utilities for the genheap integration suite
//!
//! Every fixture owns its own heap, root table and finalizer, so tests run
//! in parallel without sharing collector state.

#![allow(dead_code)]

use genheap::{
    Address, GcConfig, GcGeneration, Heap, LayoutTable, QueuedFinalizer, RootHandle, RootTable,
    SlotLayout, TypeTag,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const KB: usize = 1024;
pub const MB: usize = 1024 * 1024;

/// Maximum wait for background work
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One reference at offset 0, 16 bytes
pub const NODE: TypeTag = TypeTag(1);
/// References at offsets 0 and 8, plus an 8-byte id at offset 16
pub const PAIR: TypeTag = TypeTag(2);
/// Every word is a reference
pub const ARRAY: TypeTag = TypeTag(3);

pub const PAIR_SIZE: usize = 24;
pub const PAIR_ID_OFFSET: usize = 16;

/// Small heap: a 128KB Gen0 segment still fits the default LOH threshold
pub fn small_config() -> GcConfig {
    GcConfig {
        gen0_segment_size: 128 * KB,
        gen0_max_size: MB,
        gen1_segment_size: 256 * KB,
        gen2_segment_size: 512 * KB,
        loh_segment_size: MB,
        max_heap_size: 16 * MB,
        background_gc: false,
        ..Default::default()
    }
}

pub fn layouts() -> LayoutTable {
    let mut layouts = LayoutTable::new();
    layouts
        .register(NODE, SlotLayout::Fixed(vec![0]))
        .register(PAIR, SlotLayout::Fixed(vec![0, 8]))
        .register(ARRAY, SlotLayout::AllSlots);
    layouts
}

/// Heap fixture with a queued finalizer
pub struct HeapFixture {
    pub heap: Heap,
    pub roots: Arc<RootTable>,
    pub finalizer: Arc<QueuedFinalizer>,
    pub config: GcConfig,
}

impl HeapFixture {
    pub fn new() -> Self {
        Self::with_config(small_config())
    }

    pub fn with_config(config: GcConfig) -> Self {
        let roots = Arc::new(RootTable::new());
        let finalizer = Arc::new(QueuedFinalizer::new());
        let heap = Heap::create(
            config.clone(),
            roots.clone(),
            Arc::new(layouts()),
            finalizer.clone(),
        )
        .unwrap_or_else(|e| panic!("heap creation failed: {}", e));
        Self {
            heap,
            roots,
            finalizer,
            config,
        }
    }

    pub fn allocate(&self, size: usize) -> Address {
        self.heap
            .allocate(size)
            .unwrap_or_else(|e| panic!("allocation of {} bytes failed: {}", size, e))
    }

    pub fn allocate_many(&self, count: usize, size: usize) -> Vec<Address> {
        (0..count).map(|_| self.allocate(size)).collect()
    }

    /// Allocate a PAIR object carrying `id`
    pub fn pair(&self, id: u64) -> Address {
        let addr = self
            .heap
            .allocate_object(PAIR_SIZE, PAIR, false)
            .unwrap_or_else(|e| panic!("pair allocation failed: {}", e));
        self.heap
            .write_bytes(addr, PAIR_ID_OFFSET, &id.to_le_bytes())
            .unwrap_or_else(|e| panic!("id write failed: {}", e));
        addr
    }

    pub fn id_of(&self, addr: Address) -> u64 {
        let bytes = self
            .heap
            .read_bytes(addr, PAIR_ID_OFFSET, 8)
            .unwrap_or_else(|e| panic!("id read of {:#x} failed: {}", addr, e));
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        u64::from_le_bytes(word)
    }

    pub fn root(&self, addr: Address) -> RootHandle {
        self.roots.add(addr)
    }

    /// Current address behind a root handle
    pub fn resolve(&self, handle: RootHandle) -> Address {
        self.roots
            .get(handle)
            .unwrap_or_else(|| panic!("root {:?} is empty", handle))
    }

    pub fn collect(&self, generation: GcGeneration) -> genheap::CollectionReport {
        self.heap
            .collect(generation)
            .unwrap_or_else(|e| panic!("{} collection failed: {}", generation, e))
    }

    /// Ids of every PAIR reachable from the roots
    pub fn reachable_ids(&self) -> BTreeSet<u64> {
        let mut seen = BTreeSet::new();
        let mut ids = BTreeSet::new();
        let mut stack: Vec<Address> = genheap::RootProvider::enumerate_roots(&*self.roots);
        while let Some(addr) = stack.pop() {
            if addr == 0 || !seen.insert(addr) {
                continue;
            }
            assert!(self.heap.contains(addr), "reachable {:#x} was reclaimed", addr);
            ids.insert(self.id_of(addr));
            for offset in [0, 8] {
                stack.push(self.heap.read_reference(addr, offset).unwrap());
            }
        }
        ids
    }
}

impl Default for HeapFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `check` until it holds or the timeout expires
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    check()
}
