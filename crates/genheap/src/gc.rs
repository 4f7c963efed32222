//! GC Core Module - Collection Cycle
//!
//! Implements the collection pipeline. Every function here runs with the
//! heap lock held; the caller passes the locked [`HeapState`] next to the
//! lock-free parts of the heap.
//!
//! Cycle phases:
//! 1. Mark - trace from roots and remembered-set seeds
//! 2. Segregate - resurrection, weak clearing, finalization, live/garbage split
//! 3. Compact - plan, rewrite references, move payloads
//! 4. Promote - age survivors, refresh the remembered set
//! 5. Cleanup - release empty segments, update trigger and statistics
//!
//! A background Gen2 cycle performs phase 1 in quanta on the worker thread
//! and runs a short stop-the-world remark before phases 2 to 5.

use crate::allocator::PromotionPolicy;
use crate::error::invariant_failed;
use crate::heap::state::{HeapState, MarkState};
use crate::heap::HeapShared;
use crate::logging::GcEvent;
use crate::marker::{MarkStack, TraceStats, Tracer};
use crate::object::{Address, GcGeneration};
use crate::relocate::{move_objects, rewrite_references, Compactor};
use crate::runtime::{CollectorState, MarkProgress};
use crate::segregate::Segregator;
use crate::stats::{CycleRecord, GcTimer};
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Condemned generations
    pub scope: GcGeneration,
    /// Whether marking ran on the background thread
    pub background: bool,
    /// Condemned objects that survived
    pub live_objects: usize,
    /// Objects reclaimed
    pub reclaimed_objects: usize,
    /// Bytes reclaimed
    pub reclaimed_bytes: usize,
    /// Bytes promoted to an older generation
    pub promoted_bytes: usize,
    /// Objects still waiting for their finalizer
    pub pending_finalization: usize,
    /// Objects handed to the finalizer channel in this cycle
    pub finalizers_queued: usize,
    /// Queued objects reachable again, at their current address
    pub resurrected: Vec<Address>,
    /// Objects moved by compaction
    pub relocated: usize,
    /// Bytes moved by compaction
    pub relocated_bytes: usize,
    /// Weak references cleared
    pub weak_cleared: usize,
    /// Stop-the-world time in microseconds
    pub pause_us: u64,
}

/// Run a blocking collection of `scope`
pub(crate) fn collect(
    shared: &HeapShared,
    state: &mut HeapState,
    scope: GcGeneration,
    reason: &str,
) -> CollectionReport {
    let timer = GcTimer::new();
    let cycle = state.cycle + 1;
    shared.logger.log(GcEvent::CycleStart {
        cycle,
        generation: scope.to_string(),
        reason: reason.to_string(),
    });
    state.trigger.set_state(CollectorState::collecting(scope));

    let mut phase = GcTimer::new();
    let roots = shared.roots.enumerate_roots();
    let seeds = state.remset.seeds(&state.objects, scope);
    let mut stack = MarkStack::new();
    let trace = Tracer::new(
        &mut state.objects,
        &state.spaces,
        shared.types.as_ref(),
        &mut stack,
        scope,
    )
    .trace(&roots, &seeds);
    log::debug!(
        "cycle {}: marked {} objects from {} roots and {} remembered sources",
        cycle,
        trace.marked_objects,
        roots.len(),
        seeds.len()
    );
    phase_end(shared, cycle, "mark", phase.lap_us());

    complete_cycle(shared, state, scope, &mut stack, false, timer)
}

/// Begin a background Gen2 cycle: mark roots and hand over to the worker
///
/// Returns the epoch the worker must be started with.
pub(crate) fn start_background(shared: &HeapShared, state: &mut HeapState, reason: &str) -> u64 {
    state.epoch += 1;
    let epoch = state.epoch;

    shared.logger.log(GcEvent::CycleStart {
        cycle: state.cycle + 1,
        generation: GcGeneration::Gen2.to_string(),
        reason: reason.to_string(),
    });

    let roots = shared.roots.enumerate_roots();
    let mut stack = MarkStack::new();
    {
        let mut tracer = Tracer::new(
            &mut state.objects,
            &state.spaces,
            shared.types.as_ref(),
            &mut stack,
            GcGeneration::Gen2,
        );
        for root in roots {
            tracer.mark_root(root);
        }
    }

    state.marking = Some(MarkState { epoch, stack });
    state.trigger.set_state(CollectorState::Gen2BackgroundMarking);
    shared.logger.log(GcEvent::BackgroundMark {
        epoch,
        phase: "start".to_string(),
    });
    epoch
}

/// Run one marking quantum of background cycle `epoch`
///
/// Completes the cycle when marking has drained.
pub(crate) fn mark_quantum(shared: &HeapShared, state: &mut HeapState, epoch: u64) -> MarkProgress {
    let Some(mut marking) = state.marking.take() else {
        return MarkProgress::Abandoned;
    };
    if marking.epoch != epoch {
        state.marking = Some(marking);
        return MarkProgress::Abandoned;
    }

    let quantum = state.config.background_mark_quantum;
    let drained = {
        let mut tracer = Tracer::new(
            &mut state.objects,
            &state.spaces,
            shared.types.as_ref(),
            &mut marking.stack,
            GcGeneration::Gen2,
        );
        for dirty in shared.dirty.drain() {
            tracer.scan(dirty);
        }
        tracer.drain(Some(quantum))
    };

    if drained && shared.dirty.is_empty() {
        finish_marking(shared, state, marking);
        return MarkProgress::Completed;
    }

    state.marking = Some(marking);
    MarkProgress::Working
}

/// Complete an in-progress background cycle on the calling thread
///
/// Returns the epoch and report, or `None` if no cycle was marking.
pub(crate) fn finish_background(
    shared: &HeapShared,
    state: &mut HeapState,
) -> Option<(u64, CollectionReport)> {
    let marking = state.marking.take()?;
    let epoch = marking.epoch;
    Some((epoch, finish_marking(shared, state, marking)))
}

/// Stop-the-world remark and the rest of a background cycle
fn finish_marking(shared: &HeapShared, state: &mut HeapState, mut marking: MarkState) -> CollectionReport {
    let timer = GcTimer::new();
    state.trigger.set_state(CollectorState::Gen2Collecting);

    let roots = shared.roots.enumerate_roots();
    let remark: TraceStats = {
        let mut tracer = Tracer::new(
            &mut state.objects,
            &state.spaces,
            shared.types.as_ref(),
            &mut marking.stack,
            GcGeneration::Gen2,
        );
        for root in roots {
            tracer.mark_root(root);
        }
        loop {
            for dirty in shared.dirty.drain() {
                tracer.scan(dirty);
            }
            tracer.drain(None);
            if shared.dirty.is_empty() {
                break;
            }
        }
        tracer.stats()
    };
    log::debug!(
        "background cycle {}: remark marked {} objects",
        marking.epoch,
        remark.marked_objects
    );
    shared.logger.log(GcEvent::BackgroundMark {
        epoch: marking.epoch,
        phase: "remark".to_string(),
    });

    complete_cycle(shared, state, GcGeneration::Gen2, &mut marking.stack, true, timer)
}

/// Apply finalizer completion reports to the queue
pub(crate) fn drain_completions(shared: &HeapShared, state: &mut HeapState) -> usize {
    let mut applied = 0;
    for object in shared.completions.try_iter() {
        if state.finalization.mark_completed(object) {
            applied += 1;
        } else {
            log::debug!("completion for {:#x} has no queue entry", object);
        }
    }
    applied
}

/// Phases 2 to 5, after marking has finished
fn complete_cycle(
    shared: &HeapShared,
    state: &mut HeapState,
    scope: GcGeneration,
    stack: &mut MarkStack,
    background: bool,
    timer: GcTimer,
) -> CollectionReport {
    let cycle = state.cycle + 1;
    let types = shared.types.as_ref();
    let mut phase = GcTimer::new();

    drain_completions(shared, state);

    let segregation = Segregator {
        objects: &mut state.objects,
        spaces: &state.spaces,
        types,
        weak: &mut state.weak,
        queue: &mut state.finalization,
        finalizer: shared.finalizer.as_ref(),
        stack,
        scope,
    }
    .run();

    for &object in &segregation.resurrected {
        shared.logger.log(GcEvent::Resurrection {
            cycle,
            address: object,
        });
    }
    if segregation.weak_cleared > 0 {
        shared.logger.log(GcEvent::WeakCleared {
            cycle,
            count: segregation.weak_cleared,
        });
    }
    if segregation.finalizers_queued > 0 {
        shared.logger.log(GcEvent::FinalizersQueued {
            cycle,
            count: segregation.finalizers_queued,
        });
    }
    for (addr, header) in &segregation.garbage {
        if header.is_large() {
            state.spaces.loh_mut().free(*addr, header.size());
        }
    }
    phase_end(shared, cycle, "segregate", phase.lap_us());

    let fixed: BTreeSet<Address> = state.finalization.iter().map(|entry| entry.object).collect();
    let compact_loh = scope == GcGeneration::Gen2 && state.compact_loh_once;
    let plan = match Compactor::new(PromotionPolicy::new()).plan(
        &mut state.spaces,
        &mut state.objects,
        scope,
        &fixed,
        compact_loh,
    ) {
        Ok(plan) => plan,
        Err(e) => invariant_failed(
            "compaction destination mapped",
            format!("cannot place survivors of cycle {}: {}", cycle, e),
        ),
    };
    if compact_loh {
        state.compact_loh_once = false;
        log::info!("cycle {}: LOH compaction moved {} objects", cycle, plan.large_moves);
    }
    for &(generation, mapped) in &plan.grown {
        shared.logger.log(GcEvent::SegmentGrowth {
            generation: generation.to_string(),
            segment_size: mapped,
            beyond_cap: state.spaces.committed() > state.config.max_heap_size,
        });
    }

    let mut owners: BTreeSet<Address> = segregation.live.iter().copied().collect();
    owners.extend(state.remset.iter());
    let slots = rewrite_references(&mut state.spaces, &state.objects, types, &owners, &plan.map);
    if !plan.map.is_empty() {
        shared.roots.relocate_roots(&plan.map);
        state.weak.relocate(&plan.map);
        state.finalization.relocate(&plan.map);
        state.remset.relocate(&plan.map);
        shared.dirty.relocate(&plan.map);
    }
    let moved = move_objects(&mut state.spaces, &mut state.objects, &plan.map);
    log::debug!(
        "cycle {}: moved {} objects ({} bytes), rewrote {} slots",
        cycle,
        moved.objects_moved,
        moved.bytes_moved,
        slots
    );
    phase_end(shared, cycle, "compact", phase.lap_us());

    let live: Vec<Address> = segregation
        .live
        .iter()
        .map(|&addr| plan.map.forward(addr))
        .collect();
    let survivors: Vec<Address> = live
        .iter()
        .copied()
        .filter(|addr| !fixed.contains(addr))
        .collect();
    let promotion = PromotionPolicy::new().promote(&mut state.objects, &survivors);
    let remembered = state
        .remset
        .refresh(&state.objects, &state.spaces, types, live.iter().copied());
    phase_end(shared, cycle, "promote", phase.lap_us());

    let mut released = 0;
    for index in 0..3 {
        released += state.spaces.gen_mut(index).release_empty();
    }
    if scope == GcGeneration::Gen2 {
        released += state.spaces.loh_mut().release_empty();
    }

    state.cycle = cycle;
    state.trigger.record_collection(scope, &promotion);
    if !state.trigger.in_no_gc_region() {
        state.trigger.set_state(CollectorState::Idle);
    }
    phase_end(shared, cycle, "cleanup", phase.lap_us());

    let report = CollectionReport {
        cycle,
        scope,
        background,
        live_objects: segregation.live.len(),
        reclaimed_objects: segregation.garbage.len(),
        reclaimed_bytes: segregation.reclaimed_bytes(),
        promoted_bytes: promotion.promoted_bytes,
        pending_finalization: state.finalization.pending_count(),
        finalizers_queued: segregation.finalizers_queued,
        resurrected: segregation
            .resurrected
            .iter()
            .map(|&addr| plan.map.forward(addr))
            .collect(),
        relocated: moved.objects_moved,
        relocated_bytes: moved.bytes_moved,
        weak_cleared: segregation.weak_cleared,
        pause_us: timer.elapsed_us(),
    };

    shared.stats.record_collection(&CycleRecord {
        scope: Some(scope),
        background,
        pause: timer.elapsed(),
        reclaimed_objects: report.reclaimed_objects,
        reclaimed_bytes: report.reclaimed_bytes,
        promoted_bytes: report.promoted_bytes,
        relocated_bytes: report.relocated_bytes,
        resurrected: report.resurrected.len(),
    });
    shared.logger.log(GcEvent::CycleEnd {
        cycle,
        generation: scope.to_string(),
        duration_us: report.pause_us,
        live_objects: report.live_objects,
        reclaimed_bytes: report.reclaimed_bytes,
        promoted_bytes: report.promoted_bytes,
    });
    log::debug!(
        "cycle {}: {} remembered sources, {} bytes of segments released",
        cycle,
        remembered,
        released
    );

    shared.background_done.notify_all();
    report
}

fn phase_end(shared: &HeapShared, cycle: u64, phase: &str, duration_us: u64) {
    shared.logger.log(GcEvent::PhaseEnd {
        cycle,
        phase: phase.to_string(),
        duration_us,
    });
}
