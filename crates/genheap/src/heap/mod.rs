//! Heap Module - The mutator-facing managed heap
//!
//! [`Heap`] owns every collector structure. One `parking_lot::Mutex` guards
//! the mutable state; every mutator operation takes it, which makes every
//! call a safe point and every synchronous collection stop-the-world.
//!
//! Sub-modules:
//! - `segment`: Memory-mapped segments with bump cursors
//! - `page`: Page size helpers
//! - `state`: Everything behind the heap lock
//!
//! # Example
//!
//! ```rust
//! use genheap::{GcConfig, GcGeneration, Heap, LayoutTable, QueuedFinalizer, RootTable};
//! use std::sync::Arc;
//!
//! fn main() -> genheap::Result<()> {
//!     let roots = Arc::new(RootTable::new());
//!     let heap = Heap::create(
//!         GcConfig::default(),
//!         roots.clone(),
//!         Arc::new(LayoutTable::new()),
//!         Arc::new(QueuedFinalizer::new()),
//!     )?;
//!
//!     let kept = heap.allocate(64)?;
//!     let handle = roots.add(kept);
//!     heap.allocate(64)?;
//!
//!     let report = heap.collect(GcGeneration::Gen0)?;
//!     assert_eq!(report.reclaimed_objects, 1);
//!     assert!(heap.contains(roots.get(handle).unwrap()));
//!
//!     heap.shutdown();
//!     Ok(())
//! }
//! ```

pub mod page;
pub mod segment;
pub(crate) mod state;

use crate::config::{GcConfig, LatencyMode};
use crate::error::{GcError, Result};
use crate::gc::{self, CollectionReport};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig};
use crate::marker::{needs_remembering, DirtySet, RootProvider};
use crate::object::{
    align_size, Address, GcGeneration, Generation, ObjectHeader, TypeDescriptor, TypeTag,
    WeakHandle, WeakReferenceEntry, REFERENCE_SIZE,
};
use crate::runtime::finalizer::completion_channel;
use crate::runtime::background::MarkingTarget;
use crate::runtime::{
    AllocationContext, BackgroundCoordinator, BackgroundEvent, BudgetCharge, CollectorState,
    FinalizerChannel, MarkProgress, Safepoint,
};
use crate::stats::{GcStats, GcSummary};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use state::HeapState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parts of the heap shared with the background marker
pub(crate) struct HeapShared {
    pub(crate) state: Mutex<HeapState>,
    pub(crate) roots: Arc<dyn RootProvider>,
    pub(crate) types: Arc<dyn TypeDescriptor>,
    pub(crate) finalizer: Arc<dyn FinalizerChannel>,
    /// Finalizer completion reports
    pub(crate) completions: Receiver<Address>,
    /// Marked objects stored into while marking
    pub(crate) dirty: DirtySet,
    pub(crate) logger: GcLogger,
    pub(crate) stats: GcStats,
    pub(crate) safepoint: Safepoint,
    /// Signalled at the end of every cycle
    pub(crate) background_done: Condvar,
}

impl MarkingTarget for HeapShared {
    fn mark_quantum(&self, epoch: u64) -> MarkProgress {
        let mut state = self.state.lock();
        gc::mark_quantum(self, &mut state, epoch)
    }
}

/// What became of a collection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The collection ran on the calling thread
    Completed(CollectionReport),
    /// A background Gen2 cycle was started
    BackgroundStarted { epoch: u64 },
    /// Parked until the next [`Heap::safepoint`]
    Deferred,
    /// A no-GC region is active
    Declined,
}

/// Heap occupancy snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    /// Bytes below the Gen0 bump cursors
    pub gen0_used: usize,
    /// Bytes mapped for Gen0
    pub gen0_committed: usize,
    /// Bytes below the Gen1 bump cursors
    pub gen1_used: usize,
    /// Bytes mapped for Gen1
    pub gen1_committed: usize,
    /// Bytes below the Gen2 bump cursors
    pub gen2_used: usize,
    /// Bytes mapped for Gen2
    pub gen2_committed: usize,
    /// Bytes mapped for the large object heap
    pub loh_committed: usize,
    /// Free bytes in the large object heap
    pub loh_free: usize,
    /// Largest free block of the large object heap
    pub loh_largest_free: usize,
    /// Bytes mapped across all spaces
    pub committed: usize,
    /// Configured cap
    pub max_heap_size: usize,
    /// Live objects per generation tag
    pub gen0_objects: usize,
    pub gen1_objects: usize,
    pub gen2_objects: usize,
    pub large_objects: usize,
    /// Objects with a non-zero pin count
    pub pinned_objects: usize,
    /// Objects waiting for their finalizer
    pub pending_finalization: usize,
    /// Registered weak references
    pub weak_references: usize,
    /// Old-to-young reference sources
    pub remembered_sources: usize,
}

/// Heap - a generational mark-compact managed heap
///
/// Thread-safe; share it behind an `Arc`. Addresses held outside the root
/// provider are invalid after any call that may collect.
pub struct Heap {
    shared: Arc<HeapShared>,
    coordinator: Option<BackgroundCoordinator>,
    shut_down: AtomicBool,
}

impl Heap {
    /// Create a heap
    ///
    /// Maps the initial Gen0, Gen1 and Gen2 segments, attaches the finalizer
    /// channel and, when `background_gc` is set, starts the background
    /// marking thread.
    pub fn create(
        config: GcConfig,
        roots: Arc<dyn RootProvider>,
        types: Arc<dyn TypeDescriptor>,
        finalizer: Arc<dyn FinalizerChannel>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GcError::Configuration(e.to_string()))?;

        let background_gc = config.background_gc;
        let logger = GcLogger::new(GcLoggerConfig::from(&config));
        let stats = GcStats::new(config.stats_enabled);
        let state = HeapState::new(config)?;

        let (completion, completions) = completion_channel();
        finalizer.attach(completion);

        let shared = Arc::new(HeapShared {
            state: Mutex::new(state),
            roots,
            types,
            finalizer,
            completions,
            dirty: DirtySet::new(),
            logger,
            stats,
            safepoint: Safepoint::new(),
            background_done: Condvar::new(),
        });

        let coordinator = if background_gc {
            Some(BackgroundCoordinator::spawn(Arc::downgrade(&shared))?)
        } else {
            None
        };

        log::info!(
            "heap created: {} bytes committed, background marking {}",
            shared.state.lock().spaces.committed(),
            if background_gc { "on" } else { "off" }
        );

        Ok(Self {
            shared,
            coordinator,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Stop the background thread
    ///
    /// An in-progress background cycle is completed first. Idempotent; also
    /// run on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut state = self.lock();
            self.finish_background(&mut state);
        }
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown();
        }
        log::info!(
            "heap shut down after {} collections",
            self.shared.stats.collection_count(GcGeneration::Gen0)
        );
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate `size` zeroed bytes with no reference slots
    pub fn allocate(&self, size: usize) -> Result<Address> {
        self.allocate_object(size, TypeTag::LEAF, false)
    }

    /// Allocate an object of type `tag`
    ///
    /// Sizes are rounded up to 8 bytes; objects of at least `loh_threshold`
    /// bytes go to the large object heap. May collect.
    pub fn allocate_object(&self, size: usize, tag: TypeTag, has_finalizer: bool) -> Result<Address> {
        if size == 0 {
            return Err(GcError::InvalidArgument(
                "allocation size must be positive".to_string(),
            ));
        }
        if size > u32::MAX as usize {
            return Err(GcError::InvalidArgument(format!(
                "allocation of {} bytes exceeds the object size limit",
                size
            )));
        }
        let size = align_size(size);

        let mut state = self.lock();
        let large = size >= state.config.loh_threshold;

        if state.trigger.charge(size) == BudgetCharge::Exhausted {
            self.end_no_gc_region(&mut state, "budget exhausted");
            self.collect_locked(&mut state, GcGeneration::Gen2, "no-GC budget exhausted");
        }

        let context = AllocationContext {
            requested: size,
            large,
            ..Default::default()
        };
        if let Some(scope) = state.trigger.should_collect(&context) {
            self.run_triggered(&mut state, scope, "allocation threshold");
        }

        let addr = match Self::place(&mut state, size, large) {
            Some(addr) => addr,
            None => self.allocate_slow(&mut state, size, large)?,
        };

        let generation = if large { Generation::Large } else { Generation::Gen0 };
        let mut header = ObjectHeader::new(size as u32, generation, tag, has_finalizer);
        header.mark = state.is_marking();
        state.objects.insert(addr, header);
        state.trigger.record_allocation(size, large);
        self.shared.stats.record_allocation(size);
        Ok(addr)
    }

    fn place(state: &mut HeapState, size: usize, large: bool) -> Option<Address> {
        if large {
            state.spaces.loh_mut().allocate(size)
        } else {
            state.spaces.gen0_mut().allocate(size)
        }
    }

    /// Exhausted path: collect once, retry, then grow
    ///
    /// The LOH and no-GC regions grow before collecting; LOH collections are
    /// driven by the allocation budget instead.
    fn allocate_slow(&self, state: &mut HeapState, size: usize, large: bool) -> Result<Address> {
        if large || state.trigger.in_no_gc_region() {
            if let Some(addr) = self.grow_and_place(state, size, large) {
                return Ok(addr);
            }
        }
        if state.trigger.in_no_gc_region() {
            self.end_no_gc_region(state, "reserved space exhausted");
        }

        let context = AllocationContext {
            requested: size,
            large,
            gen0_exhausted: !large,
            loh_exhausted: large,
        };
        let scope = state.trigger.should_collect(&context).unwrap_or(if large {
            GcGeneration::Gen2
        } else {
            GcGeneration::Gen0
        });
        self.collect_locked(state, scope, "allocation failure");

        if let Some(addr) = Self::place(state, size, large) {
            return Ok(addr);
        }
        if let Some(addr) = self.grow_and_place(state, size, large) {
            return Ok(addr);
        }

        let committed = state.spaces.committed();
        self.shared.logger.log(GcEvent::AllocationFailure { size, committed });
        let available = if large {
            state.spaces.loh().largest_free_block()
        } else {
            state.gen0_available()
        };
        Err(GcError::AllocationFailure {
            requested: size,
            available,
        })
    }

    /// Map one more segment within the caps and allocate from it
    fn grow_and_place(&self, state: &mut HeapState, size: usize, large: bool) -> Option<Address> {
        let committed = state.spaces.committed();
        let max_heap_size = state.config.max_heap_size;

        let (grown, label) = if large {
            if committed + state.spaces.loh().growth_size(size) > max_heap_size {
                return None;
            }
            (state.spaces.loh_mut().grow(size), Generation::Large)
        } else {
            if !state.spaces.gen0().can_grow(committed, max_heap_size) {
                return None;
            }
            (state.spaces.gen0_mut().grow(size), Generation::Gen0)
        };

        match grown {
            Ok(mapped) => {
                self.shared.logger.log(GcEvent::SegmentGrowth {
                    generation: label.to_string(),
                    segment_size: mapped,
                    beyond_cap: false,
                });
                Self::place(state, size, large)
            }
            Err(e) => {
                log::warn!("cannot grow {}: {}", label, e);
                None
            }
        }
    }

    // ========================================================================
    // Collection control
    // ========================================================================

    /// Ask for a collection of `generation` and its younger generations
    ///
    /// Advisory: declined inside a no-GC region, parked for the next
    /// safepoint while background marking runs or the heap is busy, and run
    /// as a background cycle when the latency settings prefer it.
    pub fn request_collection(&self, generation: GcGeneration) -> RequestOutcome {
        let Some(mut state) = self.shared.state.try_lock() else {
            self.shared.safepoint.request(generation);
            return RequestOutcome::Deferred;
        };

        if state.trigger.in_no_gc_region() {
            log::debug!("{} collection declined inside a no-GC region", generation);
            return RequestOutcome::Declined;
        }
        if state.is_marking() {
            self.shared.safepoint.request(generation);
            return RequestOutcome::Deferred;
        }
        if state.trigger.use_background(generation) {
            if let Some(epoch) = self.begin_background(&mut state, "requested") {
                return RequestOutcome::BackgroundStarted { epoch };
            }
        }
        RequestOutcome::Completed(self.collect_locked(&mut state, generation, "requested"))
    }

    /// Collect `generation` and its younger generations now
    ///
    /// Blocking. An in-progress background cycle is completed instead, which
    /// covers every generation.
    pub fn collect(&self, generation: GcGeneration) -> Result<CollectionReport> {
        let mut state = self.lock();
        if state.trigger.in_no_gc_region() {
            return Err(GcError::NoGcRegionActive);
        }
        Ok(self.collect_locked(&mut state, generation, "forced"))
    }

    /// Serve a parked collection request, if any
    pub fn safepoint(&self) -> Option<CollectionReport> {
        let generation = self.shared.safepoint.take()?;
        let mut state = self.lock();
        if state.trigger.in_no_gc_region() {
            log::debug!("parked {} collection dropped inside a no-GC region", generation);
            return None;
        }
        Some(self.collect_locked(&mut state, generation, "safepoint"))
    }

    /// Collections that condemned `generation`
    ///
    /// A Gen2 collection also counts for Gen0 and Gen1.
    pub fn collection_count(&self, generation: GcGeneration) -> u64 {
        self.shared.stats.collection_count(generation)
    }

    /// Arm a one-shot compaction of the large object heap
    ///
    /// Applied by the next Gen2 collection, then disarmed.
    pub fn compact_large_object_heap_once(&self) {
        self.lock().compact_loh_once = true;
    }

    fn collect_locked(&self, state: &mut HeapState, scope: GcGeneration, reason: &str) -> CollectionReport {
        if let Some(report) = self.finish_background(state) {
            return report;
        }
        gc::collect(&self.shared, state, scope, reason)
    }

    /// Act on a proactive trigger
    fn run_triggered(&self, state: &mut HeapState, scope: GcGeneration, reason: &str) {
        if state.trigger.use_background(scope) && self.begin_background(state, reason).is_some() {
            return;
        }
        self.collect_locked(state, scope, reason);
    }

    fn begin_background(&self, state: &mut HeapState, reason: &str) -> Option<u64> {
        let coordinator = self.coordinator.as_ref()?;
        if state.is_marking() {
            return None;
        }
        let epoch = gc::start_background(&self.shared, state, reason);
        if !coordinator.start(epoch) {
            log::warn!("background marker gone, finishing cycle {} inline", epoch);
            self.finish_background(state);
            return None;
        }
        Some(epoch)
    }

    /// Complete an in-progress background cycle on this thread
    fn finish_background(&self, state: &mut HeapState) -> Option<CollectionReport> {
        let (epoch, report) = gc::finish_background(&self.shared, state)?;
        if let Some(coordinator) = &self.coordinator {
            coordinator.notify(BackgroundEvent::Completed { epoch });
        }
        Some(report)
    }

    // ========================================================================
    // Background collection
    // ========================================================================

    /// Whether a background cycle is marking
    pub fn is_background_marking(&self) -> bool {
        self.lock().is_marking()
    }

    /// Suspend background marking between quanta
    ///
    /// Returns false if there is no background thread.
    pub fn pause_background_marking(&self) -> bool {
        self.coordinator.as_ref().map_or(false, |c| c.pause())
    }

    /// Resume suspended background marking
    pub fn resume_background_marking(&self) -> bool {
        self.coordinator.as_ref().map_or(false, |c| c.resume())
    }

    /// Wait until no background cycle is marking
    pub fn wait_for_background_collection(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.is_marking() {
            if self
                .shared
                .background_done
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.is_marking()
            {
                return Err(GcError::Timeout(format!(
                    "background collection still marking after {:?}",
                    timeout
                )));
            }
        }
        Ok(())
    }

    /// Background events reported since the last call
    pub fn background_events(&self) -> Vec<BackgroundEvent> {
        self.coordinator
            .as_ref()
            .map(|c| c.events())
            .unwrap_or_default()
    }

    // ========================================================================
    // Pinning
    // ========================================================================

    /// Prevent an object from moving
    ///
    /// Pins nest; each pin needs a matching unpin.
    pub fn pin(&self, addr: Address) -> Result<()> {
        let mut state = self.lock();
        let header = state
            .objects
            .get_mut(addr)
            .ok_or(GcError::InvalidPinHandle { address: addr })?;
        header.pin_count = header
            .pin_count
            .checked_add(1)
            .ok_or(GcError::PinCountOverflow { address: addr })?;
        Ok(())
    }

    /// Release one pin
    pub fn unpin(&self, addr: Address) -> Result<()> {
        let mut state = self.lock();
        let header = state
            .objects
            .get_mut(addr)
            .ok_or(GcError::InvalidPinHandle { address: addr })?;
        if header.pin_count == 0 {
            return Err(GcError::DoubleUnpin { address: addr });
        }
        header.pin_count -= 1;
        Ok(())
    }

    /// Whether an object is pinned
    pub fn is_pinned(&self, addr: Address) -> Result<bool> {
        let state = self.lock();
        let header = Self::header(&state, addr)?;
        Ok(header.is_pinned())
    }

    // ========================================================================
    // Trigger & latency control
    // ========================================================================

    /// Account for unmanaged memory kept alive by managed objects
    pub fn add_memory_pressure(&self, bytes: usize) {
        self.lock().trigger.add_memory_pressure(bytes);
    }

    /// Undo [`add_memory_pressure`](Heap::add_memory_pressure)
    pub fn remove_memory_pressure(&self, bytes: usize) {
        self.lock().trigger.remove_memory_pressure(bytes);
    }

    /// Switch latency mode; returns the previous mode
    pub fn set_latency_mode(&self, mode: LatencyMode) -> LatencyMode {
        let previous = self.lock().trigger.set_latency_mode(mode);
        if previous != mode {
            self.shared.logger.log(GcEvent::LatencyChange {
                from: previous.to_string(),
                to: mode.to_string(),
            });
        }
        previous
    }

    /// Current latency mode
    pub fn latency_mode(&self) -> LatencyMode {
        self.lock().trigger.latency_mode()
    }

    /// What the collector is doing
    pub fn collector_state(&self) -> CollectorState {
        self.lock().trigger.state()
    }

    /// Suspend collections until `budget` bytes have been allocated
    ///
    /// Gen0 is grown up front so the budget can be served without
    /// collecting. Fails with `InsufficientBudget` when the caps do not
    /// allow it. An in-progress background cycle is completed first.
    pub fn try_enter_no_gc_region(&self, budget: usize) -> Result<()> {
        let mut state = self.lock();
        if state.trigger.in_no_gc_region() {
            return Err(GcError::NoGcRegionActive);
        }
        self.finish_background(&mut state);

        let available = state.gen0_available();
        state.trigger.enter_no_gc_region(budget, available)?;

        while state.spaces.gen0().free_bytes() < budget {
            match state.spaces.gen0_mut().grow(0) {
                Ok(mapped) => self.shared.logger.log(GcEvent::SegmentGrowth {
                    generation: Generation::Gen0.to_string(),
                    segment_size: mapped,
                    beyond_cap: false,
                }),
                Err(e) => {
                    let _ = state.trigger.exit_no_gc_region();
                    return Err(e);
                }
            }
        }

        self.shared.logger.log(GcEvent::NoGcRegion {
            entered: true,
            budget,
        });
        Ok(())
    }

    /// Leave the no-GC region
    pub fn exit_no_gc_region(&self) -> Result<()> {
        let mut state = self.lock();
        let remaining = state.trigger.no_gc_remaining().unwrap_or(0);
        state.trigger.exit_no_gc_region()?;
        self.shared.logger.log(GcEvent::NoGcRegion {
            entered: false,
            budget: remaining,
        });
        Ok(())
    }

    /// Whether a no-GC region is active
    pub fn in_no_gc_region(&self) -> bool {
        self.lock().trigger.in_no_gc_region()
    }

    fn end_no_gc_region(&self, state: &mut HeapState, reason: &str) {
        let remaining = state.trigger.no_gc_remaining().unwrap_or(0);
        if state.trigger.exit_no_gc_region().is_ok() {
            log::warn!("no-GC region ended: {}", reason);
            self.shared.logger.log(GcEvent::NoGcRegion {
                entered: false,
                budget: remaining,
            });
        }
    }

    // ========================================================================
    // Weak references
    // ========================================================================

    /// Register a short weak reference
    ///
    /// Cleared as soon as the referent is found unreachable.
    pub fn register_weak_reference(&self, target: Address) -> Result<WeakHandle> {
        self.register_weak(target, false)
    }

    /// Register a long weak reference
    ///
    /// Survives while the referent waits for its finalizer.
    pub fn register_weak_reference_tracking(&self, target: Address) -> Result<WeakHandle> {
        self.register_weak(target, true)
    }

    fn register_weak(&self, target: Address, track_resurrection: bool) -> Result<WeakHandle> {
        let mut state = self.lock();
        if !state.objects.contains(target) {
            return Err(GcError::InvalidAddress { address: target });
        }
        Ok(state.weak.register(target, track_resurrection))
    }

    /// Current referent, `None` once cleared
    pub fn resolve_weak_reference(&self, handle: WeakHandle) -> Result<Option<Address>> {
        self.lock().weak.resolve(handle)
    }

    /// Snapshot of a weak entry
    pub fn weak_reference_entry(&self, handle: WeakHandle) -> Result<WeakReferenceEntry> {
        self.lock().weak.entry(handle).cloned()
    }

    /// Release a weak handle
    pub fn free_weak_reference(&self, handle: WeakHandle) -> Result<()> {
        self.lock().weak.free(handle)
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Skip the finalizer of an object
    pub fn suppress_finalize(&self, addr: Address) -> Result<()> {
        let mut state = self.lock();
        let header = state
            .objects
            .get_mut(addr)
            .ok_or(GcError::InvalidAddress { address: addr })?;
        header.has_finalizer = false;
        Ok(())
    }

    /// Run the finalizer again the next time the object is unreachable
    pub fn reregister_for_finalize(&self, addr: Address) -> Result<()> {
        let mut state = self.lock();
        gc::drain_completions(&self.shared, &mut state);
        let header = state
            .objects
            .get_mut(addr)
            .ok_or(GcError::InvalidAddress { address: addr })?;
        header.has_finalizer = true;
        if state
            .finalization
            .get(addr)
            .map_or(false, |entry| entry.finalizer_ran)
        {
            state.finalization.remove(addr);
        }
        Ok(())
    }

    /// Objects waiting for their finalizer to run
    pub fn pending_finalizers(&self) -> usize {
        let mut state = self.lock();
        gc::drain_completions(&self.shared, &mut state);
        state.finalization.pending_count()
    }

    /// Wait until every queued finalizer has reported completion
    pub fn wait_for_pending_finalizers(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.lock();
                gc::drain_completions(&self.shared, &mut state);
                if state.finalization.pending_count() == 0 {
                    return Ok(());
                }
            }

            let wait = deadline.saturating_duration_since(Instant::now());
            match self.shared.completions.recv_timeout(wait) {
                Ok(object) => {
                    self.lock().finalization.mark_completed(object);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(GcError::Timeout(format!(
                        "finalizers still pending after {:?}",
                        timeout
                    )));
                }
            }
        }
    }

    // ========================================================================
    // Object access
    // ========================================================================

    /// Whether `addr` is a live object
    pub fn contains(&self, addr: Address) -> bool {
        self.lock().objects.contains(addr)
    }

    /// Generation tag of an object
    pub fn generation_of(&self, addr: Address) -> Result<Generation> {
        let state = self.lock();
        Ok(Self::header(&state, addr)?.generation)
    }

    /// Size of an object in bytes
    pub fn size_of(&self, addr: Address) -> Result<usize> {
        let state = self.lock();
        Ok(Self::header(&state, addr)?.size())
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Read the reference slot at `offset`
    pub fn read_reference(&self, addr: Address, offset: usize) -> Result<Address> {
        let state = self.lock();
        self.reference_slot(&state, addr, offset)?;
        Ok(state.spaces.read_word(addr + offset))
    }

    /// Store `value` in the reference slot at `offset`
    ///
    /// This is the write barrier: old-to-young stores are remembered, and
    /// stores into already-marked objects are reported to the background
    /// marker. `value` is 0 or a live object.
    pub fn write_reference(&self, addr: Address, offset: usize, value: Address) -> Result<()> {
        let mut state = self.lock();
        let source = self.reference_slot(&state, addr, offset)?;
        let target = if value == 0 {
            None
        } else {
            Some(Self::header(&state, value)?.generation)
        };

        state.spaces.write_word(addr + offset, value);

        if let Some(target) = target {
            if needs_remembering(source.generation, target) {
                state.remset.record(addr);
            }
        }
        if source.mark && state.is_marking() {
            self.shared.dirty.push(addr);
        }
        Ok(())
    }

    /// Copy `len` payload bytes starting at `offset`
    pub fn read_bytes(&self, addr: Address, offset: usize, len: usize) -> Result<Vec<u8>> {
        let state = self.lock();
        let header = Self::header(&state, addr)?;
        if offset.checked_add(len).map_or(true, |end| end > header.size()) {
            return Err(GcError::InvalidSlot {
                address: addr,
                offset,
            });
        }
        Ok(state.spaces.bytes(addr + offset, len).to_vec())
    }

    /// Overwrite payload bytes starting at `offset`
    ///
    /// The range must not overlap a reference slot; use
    /// [`write_reference`](Heap::write_reference) for those.
    pub fn write_bytes(&self, addr: Address, offset: usize, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let header = Self::header(&state, addr)?.clone();
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= header.size() => end,
            _ => {
                return Err(GcError::InvalidSlot {
                    address: addr,
                    offset,
                })
            }
        };
        let offsets = self.shared.types.reference_offsets(header.type_tag, header.size());
        if let Some(&slot) = offsets
            .iter()
            .find(|&&slot| slot < end && offset < slot + REFERENCE_SIZE)
        {
            return Err(GcError::InvalidSlot {
                address: addr,
                offset: slot,
            });
        }
        state.spaces.bytes_mut(addr + offset, data.len()).copy_from_slice(data);
        Ok(())
    }

    fn header(state: &HeapState, addr: Address) -> Result<&ObjectHeader> {
        state
            .objects
            .get(addr)
            .ok_or(GcError::InvalidAddress { address: addr })
    }

    /// Header of `addr` if `offset` is one of its reference slots
    fn reference_slot(&self, state: &HeapState, addr: Address, offset: usize) -> Result<ObjectHeader> {
        let header = Self::header(state, addr)?;
        let offsets = self.shared.types.reference_offsets(header.type_tag, header.size());
        if !offsets.contains(&offset) {
            return Err(GcError::InvalidSlot {
                address: addr,
                offset,
            });
        }
        Ok(header.clone())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Check heap consistency
    ///
    /// Panics through `heap_invariant!` on any violation: a surviving
    /// forwarding pointer, a stray mark bit, overlapping or unmapped objects,
    /// a corrupt LOH free list, or a dangling reference. Returns the number
    /// of objects checked.
    pub fn verify_heap(&self) -> usize {
        let state = self.lock();
        let marking = state.is_marking();
        let mut previous_end: Address = 0;

        for (addr, header) in state.objects.iter() {
            crate::heap_invariant!(
                header.forwarding.is_none(),
                "forwarding pointer left on {:#x}",
                addr
            );
            crate::heap_invariant!(
                marking || !header.mark,
                "mark bit left on {:#x} outside a cycle",
                addr
            );
            crate::heap_invariant!(
                addr >= previous_end,
                "object {:#x} overlaps its predecessor ending at {:#x}",
                addr,
                previous_end
            );
            let end = addr + header.size();
            crate::heap_invariant!(
                state
                    .spaces
                    .segment_of(addr)
                    .map_or(false, |segment| segment.contains(end - 1)),
                "object {:#x} ({} bytes) is not inside one segment",
                addr,
                header.size()
            );
            previous_end = end;

            let offsets = self.shared.types.reference_offsets(header.type_tag, header.size());
            for &off in offsets.iter() {
                let target = state.spaces.read_word(addr + off);
                crate::heap_invariant!(
                    target == 0 || state.objects.contains(target),
                    "slot {} of {:#x} references dead address {:#x}",
                    off,
                    addr,
                    target
                );
            }
        }

        state.spaces.loh().verify();

        for target in state.weak.targets() {
            crate::heap_invariant!(
                state.objects.contains(target),
                "weak reference to dead address {:#x}",
                target
            );
        }
        for entry in state.finalization.iter() {
            crate::heap_invariant!(
                state.objects.contains(entry.object),
                "finalization entry for dead address {:#x}",
                entry.object
            );
        }
        for source in state.remset.iter() {
            crate::heap_invariant!(
                state.objects.contains(source),
                "remembered source {:#x} is dead",
                source
            );
        }

        state.objects.len()
    }

    /// Heap occupancy snapshot
    pub fn heap_stats(&self) -> HeapStats {
        let state = self.lock();
        let spaces = &state.spaces;
        let mut stats = HeapStats {
            gen0_used: spaces.gen(0).used(),
            gen0_committed: spaces.gen(0).committed(),
            gen1_used: spaces.gen(1).used(),
            gen1_committed: spaces.gen(1).committed(),
            gen2_used: spaces.gen(2).used(),
            gen2_committed: spaces.gen(2).committed(),
            loh_committed: spaces.loh().committed(),
            loh_free: spaces.loh().free_bytes(),
            loh_largest_free: spaces.loh().largest_free_block(),
            committed: spaces.committed(),
            max_heap_size: state.config.max_heap_size,
            pending_finalization: state.finalization.pending_count(),
            weak_references: state.weak.len(),
            remembered_sources: state.remset.len(),
            ..Default::default()
        };
        for (_, header) in state.objects.iter() {
            match header.generation {
                Generation::Gen0 => stats.gen0_objects += 1,
                Generation::Gen1 => stats.gen1_objects += 1,
                Generation::Gen2 => stats.gen2_objects += 1,
                Generation::Large => stats.large_objects += 1,
            }
            if header.is_pinned() {
                stats.pinned_objects += 1;
            }
        }
        stats
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let heap_stats = self.heap_stats();
        let summary = self.shared.stats.summary();
        let mut diagnostics = IndexMap::new();

        {
            let state = self.lock();
            diagnostics.insert("state".to_string(), state.trigger.state().to_string());
            diagnostics.insert(
                "latency_mode".to_string(),
                state.trigger.latency_mode().to_string(),
            );
            diagnostics.insert("cycle_count".to_string(), state.cycle.to_string());
            diagnostics.insert("background_epoch".to_string(), state.epoch.to_string());
            diagnostics.insert(
                "memory_pressure".to_string(),
                state.trigger.memory_pressure().to_string(),
            );
            diagnostics.insert(
                "bytes_since_gen2".to_string(),
                state.trigger.bytes_since_gen2().to_string(),
            );
            diagnostics.insert(
                "survivor_streak".to_string(),
                state.trigger.survivor_streak().to_string(),
            );
            if let Some(remaining) = state.trigger.no_gc_remaining() {
                diagnostics.insert("no_gc_remaining".to_string(), remaining.to_string());
            }
        }

        diagnostics.insert("heap_committed".to_string(), heap_stats.committed.to_string());
        diagnostics.insert("heap_max".to_string(), heap_stats.max_heap_size.to_string());
        diagnostics.insert(
            "heap_utilization".to_string(),
            format!(
                "{:.2}",
                heap_stats.committed as f64 / heap_stats.max_heap_size as f64
            ),
        );
        diagnostics.insert("gen0_used".to_string(), heap_stats.gen0_used.to_string());
        diagnostics.insert("gen1_used".to_string(), heap_stats.gen1_used.to_string());
        diagnostics.insert("gen2_used".to_string(), heap_stats.gen2_used.to_string());
        diagnostics.insert("loh_free".to_string(), heap_stats.loh_free.to_string());
        diagnostics.insert(
            "objects".to_string(),
            (heap_stats.gen0_objects
                + heap_stats.gen1_objects
                + heap_stats.gen2_objects
                + heap_stats.large_objects)
                .to_string(),
        );
        diagnostics.insert(
            "pinned_objects".to_string(),
            heap_stats.pinned_objects.to_string(),
        );
        diagnostics.insert(
            "pending_finalization".to_string(),
            heap_stats.pending_finalization.to_string(),
        );
        diagnostics.insert(
            "safepoint_pending".to_string(),
            self.shared.safepoint.is_requested().to_string(),
        );
        diagnostics.insert("total_cycles".to_string(), summary.total_cycles.to_string());
        diagnostics.insert("max_pause_us".to_string(), summary.max_pause_us.to_string());

        diagnostics
    }

    /// Collector statistics summary
    pub fn gc_summary(&self) -> GcSummary {
        self.shared.stats.summary()
    }

    /// Collector statistics
    pub fn stats(&self) -> &GcStats {
        &self.shared.stats
    }

    /// Event log of this heap
    pub fn logger(&self) -> &GcLogger {
        &self.shared.logger
    }

    /// Configuration the heap was created with
    pub fn config(&self) -> GcConfig {
        self.lock().config.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HeapState> {
        self.shared.state.lock()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("background", &self.coordinator.is_some())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}
