//! Finalizer - Object Finalization
//!
//! Objects allocated with a finalizer are not reclaimed the first time they
//! are found unreachable. Instead they are queued, handed to a
//! [`FinalizerChannel`] and kept alive (together with everything they
//! reference) until the channel reports that the finalizer has run. The
//! first cycle after that report reclaims them, unless they were made
//! reachable again in the meantime.
//!
//! Objects waiting for their finalizer never move, so the address handed to
//! the channel stays valid until completion is reported.
//!
//! Warning: Finalizers should be avoided where possible:
//! - They keep whole subgraphs alive for an extra cycle
//! - Their timing is unpredictable
//!
//! Use them only to release native resources.

use crate::error::{GcError, Result};
use crate::object::Address;
use crate::relocate::RelocationMap;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Finalizer executor supplied by the embedder
///
/// `enqueue` is called with the heap lock held and must not block or call
/// back into the heap. Completion is reported later, from any thread,
/// through the [`FinalizerCompletion`] handed to `attach`.
pub trait FinalizerChannel: Send + Sync {
    /// Receive the completion handle; called once when the heap is created
    fn attach(&self, completion: FinalizerCompletion);

    /// Schedule the finalizer of an unreachable object
    fn enqueue(&self, object: Address);
}

/// Handle for reporting finished finalizers back to the heap
#[derive(Debug, Clone)]
pub struct FinalizerCompletion {
    sender: Sender<Address>,
}

impl FinalizerCompletion {
    pub(crate) fn new(sender: Sender<Address>) -> Self {
        Self { sender }
    }

    /// Report that the finalizer of `object` has run
    ///
    /// Returns false if the heap no longer exists.
    pub fn complete(&self, object: Address) -> bool {
        self.sender.send(object).is_ok()
    }
}

/// Create the completion handle and the heap-side receiver
pub(crate) fn completion_channel() -> (FinalizerCompletion, Receiver<Address>) {
    let (sender, receiver) = channel::unbounded();
    (FinalizerCompletion::new(sender), receiver)
}

/// One object waiting for, or done with, its finalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizationEntry {
    /// Address of the finalizable object
    pub object: Address,
    /// Set once the channel reported completion
    pub finalizer_ran: bool,
}

/// FinalizationQueue - objects handed to the finalizer channel
#[derive(Debug, Default)]
pub struct FinalizationQueue {
    entries: BTreeMap<Address, FinalizationEntry>,
}

impl FinalizationQueue {
    /// Create empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object
    ///
    /// Returns false if it was already queued.
    pub fn push(&mut self, object: Address) -> bool {
        if self.entries.contains_key(&object) {
            return false;
        }
        self.entries.insert(
            object,
            FinalizationEntry {
                object,
                finalizer_ran: false,
            },
        );
        true
    }

    /// Check if an object is queued
    pub fn contains(&self, object: Address) -> bool {
        self.entries.contains_key(&object)
    }

    /// Entry for an object
    pub fn get(&self, object: Address) -> Option<&FinalizationEntry> {
        self.entries.get(&object)
    }

    /// Remove an object's entry
    pub fn remove(&mut self, object: Address) -> Option<FinalizationEntry> {
        self.entries.remove(&object)
    }

    /// Record a completion report
    ///
    /// Returns false for objects that are no longer queued.
    pub fn mark_completed(&mut self, object: Address) -> bool {
        match self.entries.get_mut(&object) {
            Some(entry) => {
                entry.finalizer_ran = true;
                true
            }
            None => false,
        }
    }

    /// Objects whose finalizer has not run yet
    pub fn pending(&self) -> Vec<Address> {
        self.entries
            .values()
            .filter(|entry| !entry.finalizer_ran)
            .map(|entry| entry.object)
            .collect()
    }

    /// Number of objects whose finalizer has not run yet
    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|entry| !entry.finalizer_ran).count()
    }

    /// Entries in address order
    pub fn iter(&self) -> impl Iterator<Item = &FinalizationEntry> + '_ {
        self.entries.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite entries that moved
    ///
    /// Queued objects are fixed during compaction; this only matters for
    /// entries resurrected and re-queued in the same cycle.
    pub fn relocate(&mut self, map: &RelocationMap) {
        if map.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_values()
            .map(|mut entry| {
                entry.object = map.forward(entry.object);
                (entry.object, entry)
            })
            .collect();
    }
}

/// QueuedFinalizer - hands finalizable objects to an external executor
///
/// The embedder drains [`take`](QueuedFinalizer::take), runs whatever cleanup
/// the object needs, and calls [`complete`](QueuedFinalizer::complete).
#[derive(Debug, Default)]
pub struct QueuedFinalizer {
    queue: Mutex<VecDeque<Address>>,
    completion: Mutex<Option<FinalizerCompletion>>,
}

impl QueuedFinalizer {
    /// Create new queued finalizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest object waiting for its finalizer
    pub fn take(&self) -> Option<Address> {
        self.queue.lock().pop_front()
    }

    /// Take every object waiting for its finalizer
    pub fn drain(&self) -> Vec<Address> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of objects waiting
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Report a finished finalizer
    ///
    /// Returns false if the channel is not attached to a live heap.
    pub fn complete(&self, object: Address) -> bool {
        match self.completion.lock().as_ref() {
            Some(completion) => completion.complete(object),
            None => false,
        }
    }
}

impl FinalizerChannel for QueuedFinalizer {
    fn attach(&self, completion: FinalizerCompletion) {
        *self.completion.lock() = Some(completion);
    }

    fn enqueue(&self, object: Address) {
        self.queue.lock().push_back(object);
    }
}

enum FinalizerMessage {
    Run(Address),
    Shutdown,
}

/// ThreadedFinalizer - runs a callback on its own thread
///
/// Every enqueued object is passed to the callback on the finalizer thread,
/// then reported complete. The callback may use the heap.
pub struct ThreadedFinalizer {
    sender: Sender<FinalizerMessage>,
    completion: Arc<Mutex<Option<FinalizerCompletion>>>,
    executed: Arc<AtomicUsize>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedFinalizer {
    /// Start the finalizer thread
    pub fn new<F>(callback: F) -> Result<Self>
    where
        F: Fn(Address) + Send + 'static,
    {
        let (sender, receiver) = channel::unbounded::<FinalizerMessage>();
        let completion: Arc<Mutex<Option<FinalizerCompletion>>> = Arc::new(Mutex::new(None));
        let executed = Arc::new(AtomicUsize::new(0));

        let thread_completion = completion.clone();
        let thread_executed = executed.clone();
        let handle = std::thread::Builder::new()
            .name("genheap-finalizer".to_string())
            .spawn(move || {
                while let Ok(FinalizerMessage::Run(object)) = receiver.recv() {
                    callback(object);
                    thread_executed.fetch_add(1, Ordering::Relaxed);
                    if let Some(completion) = thread_completion.lock().as_ref() {
                        completion.complete(object);
                    }
                }
                log::debug!("finalizer thread stopped");
            })
            .map_err(|e| GcError::Thread(format!("failed to spawn finalizer thread: {}", e)))?;

        Ok(Self {
            sender,
            completion,
            executed,
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    /// Number of finalizers run so far
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Stop the finalizer thread after the queued finalizers ran
    pub fn shutdown(&self) {
        let _ = self.sender.send(FinalizerMessage::Shutdown);
        if let Some(handle) = self.thread_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("finalizer thread panicked");
            }
        }
    }
}

impl FinalizerChannel for ThreadedFinalizer {
    fn attach(&self, completion: FinalizerCompletion) {
        *self.completion.lock() = Some(completion);
    }

    fn enqueue(&self, object: Address) {
        if self.sender.send(FinalizerMessage::Run(object)).is_err() {
            log::warn!("finalizer thread gone, {:#x} will not be finalized", object);
        }
    }
}

impl Drop for ThreadedFinalizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadedFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedFinalizer")
            .field("executed", &self.executed())
            .finish()
    }
}
