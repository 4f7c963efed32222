//! Segregation - Live/garbage classification
//!
//! Runs after tracing from real roots, while mark bits still describe true
//! reachability. In order:
//! 1. Queued objects found marked are resurrected: their entry is dropped
//!    and their finalizer flag cleared
//! 2. Short weak references to unmarked objects are cleared
//! 3. Unmarked finalizable objects are queued and handed to the finalizer
//!    channel
//! 4. Everything still waiting for its finalizer is marked, with its
//!    subgraph, so it survives this cycle
//! 5. Long weak references to unmarked objects are cleared
//! 6. Condemned objects are split into survivors and garbage; garbage
//!    headers are removed and mark bits of survivors cleared

use crate::allocator::HeapSpaces;
use crate::marker::{MarkStack, TraceStats, Tracer};
use crate::object::{Address, GcGeneration, ObjectHeader, ObjectTable, TypeDescriptor, WeakTable};
use crate::runtime::{FinalizationQueue, FinalizerChannel};

/// Result of segregating one cycle
#[derive(Debug, Default)]
pub struct Segregation {
    /// Condemned survivors, ascending, pending ones included
    pub live: Vec<Address>,
    /// Removed headers of unreachable objects
    pub garbage: Vec<(Address, ObjectHeader)>,
    /// Survivors kept alive only for their finalizer
    pub pending_finalization: Vec<Address>,
    /// Queued objects that became reachable again
    pub resurrected: Vec<Address>,
    /// Objects queued for finalization this cycle
    pub finalizers_queued: usize,
    /// Weak entries cleared
    pub weak_cleared: usize,
    /// Marking done on behalf of pending objects
    pub finalizer_trace: TraceStats,
}

impl Segregation {
    /// Bytes held by garbage
    pub fn reclaimed_bytes(&self) -> usize {
        self.garbage.iter().map(|(_, header)| header.size()).sum()
    }
}

/// Segregator - classifies the condemned part of the heap
pub struct Segregator<'a> {
    pub objects: &'a mut ObjectTable,
    pub spaces: &'a HeapSpaces,
    pub types: &'a dyn TypeDescriptor,
    pub weak: &'a mut WeakTable,
    pub queue: &'a mut FinalizationQueue,
    pub finalizer: &'a dyn FinalizerChannel,
    pub stack: &'a mut MarkStack,
    pub scope: GcGeneration,
}

impl Segregator<'_> {
    /// Classify every condemned object
    pub fn run(self) -> Segregation {
        let Segregator {
            objects,
            spaces,
            types,
            weak,
            queue,
            finalizer,
            stack,
            scope,
        } = self;
        let mut result = Segregation::default();

        let queued: Vec<Address> = queue.iter().map(|entry| entry.object).collect();
        for object in queued {
            let Some(header) = objects.get_mut(object) else {
                continue;
            };
            if scope.condemns(header.generation) && header.mark {
                header.has_finalizer = false;
                queue.remove(object);
                result.resurrected.push(object);
            }
        }

        result.weak_cleared += weak.clear_unreachable(objects, scope, false);

        let unreachable: Vec<Address> = objects
            .iter()
            .filter(|(addr, header)| {
                scope.condemns(header.generation)
                    && !header.mark
                    && header.has_finalizer
                    && !queue.contains(*addr)
            })
            .map(|(addr, _)| addr)
            .collect();
        for object in unreachable {
            queue.push(object);
            finalizer.enqueue(object);
            result.finalizers_queued += 1;
        }

        {
            let mut tracer = Tracer::new(objects, spaces, types, stack, scope);
            for object in queue.pending() {
                tracer.mark(object);
            }
            tracer.drain(None);
            result.finalizer_trace = tracer.stats();
        }

        result.weak_cleared += weak.clear_unreachable(objects, scope, true);

        for addr in objects.condemned(scope) {
            let marked = objects.get(addr).map_or(false, |header| header.mark);
            if marked {
                if let Some(header) = objects.get_mut(addr) {
                    header.mark = false;
                }
                if queue.contains(addr) {
                    result.pending_finalization.push(addr);
                }
                result.live.push(addr);
            } else if let Some(header) = objects.remove(addr) {
                queue.remove(addr);
                result.garbage.push((addr, header));
            }
        }

        result
    }
}
