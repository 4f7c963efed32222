//! Heap State - Everything guarded by the heap lock

use crate::allocator::HeapSpaces;
use crate::config::GcConfig;
use crate::error::Result;
use crate::marker::{MarkStack, RememberedSet};
use crate::object::{ObjectTable, WeakTable};
use crate::runtime::{FinalizationQueue, TriggerController};

/// An in-progress background marking cycle
#[derive(Debug)]
pub(crate) struct MarkState {
    pub epoch: u64,
    pub stack: MarkStack,
}

/// Mutable heap state
///
/// One `parking_lot::Mutex` guards all of it; holding the lock is what makes
/// a collection stop-the-world.
pub(crate) struct HeapState {
    pub config: GcConfig,
    pub spaces: HeapSpaces,
    pub objects: ObjectTable,
    pub remset: RememberedSet,
    pub weak: WeakTable,
    pub finalization: FinalizationQueue,
    pub trigger: TriggerController,
    /// Set while a background cycle is marking
    pub marking: Option<MarkState>,
    /// One-shot LOH compaction for the next Gen2
    pub compact_loh_once: bool,
    /// Completed collections
    pub cycle: u64,
    /// Last background epoch handed out
    pub epoch: u64,
}

impl HeapState {
    pub fn new(config: GcConfig) -> Result<Self> {
        let spaces = HeapSpaces::new(&config)?;
        let trigger = TriggerController::new(&config);
        Ok(Self {
            config,
            spaces,
            objects: ObjectTable::new(),
            remset: RememberedSet::new(),
            weak: WeakTable::new(),
            finalization: FinalizationQueue::new(),
            trigger,
            marking: None,
            compact_loh_once: false,
            cycle: 0,
            epoch: 0,
        })
    }

    /// Whether a background cycle is marking
    pub fn is_marking(&self) -> bool {
        self.marking.is_some()
    }

    /// Bytes Gen0 can still hand out without collecting
    pub fn gen0_available(&self) -> usize {
        let committed = self.spaces.committed();
        let gen0 = self.spaces.gen0();
        gen0.free_bytes() + gen0.growth_headroom(committed, self.config.max_heap_size)
    }
}
