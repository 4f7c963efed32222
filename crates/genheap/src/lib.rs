//! # genheap - Generational Mark-Compact Garbage Collector
//!
//! genheap is a standalone tracing garbage collector for a managed heap,
//! meant to be the memory-management engine of a small language runtime.
//!
//! ## Overview
//!
//! - **Generational**: Gen0, Gen1 and Gen2 bump-allocated spaces; survivors
//!   are promoted one generation per collection
//! - **Mark-Compact**: Explicit-stack tracing, then sliding compaction around
//!   pinned objects
//! - **Large Object Heap**: First-fit free lists for big objects, collected
//!   with Gen2 and compacted only on request
//! - **Background Marking**: Gen2 marking runs in quanta on a worker thread
//!   with a write barrier and a short final pause
//! - **Finalization & Weak References**: Two-cycle finalization with
//!   resurrection detection, short and long weak references
//! - **Latency Control**: Latency modes, memory pressure and no-GC regions
//!
//! ## Quick Start
//!
//! ```rust
//! use genheap::{GcConfig, GcGeneration, Heap, LayoutTable, QueuedFinalizer, RootTable, SlotLayout, TypeTag};
//! use std::sync::Arc;
//!
//! fn main() -> genheap::Result<()> {
//!     // Objects of tag 1 hold one reference at payload offset 0
//!     let mut layouts = LayoutTable::new();
//!     layouts.register(TypeTag(1), SlotLayout::Fixed(vec![0]));
//!
//!     let roots = Arc::new(RootTable::new());
//!     let heap = Heap::create(
//!         GcConfig::default(),
//!         roots.clone(),
//!         Arc::new(layouts),
//!         Arc::new(QueuedFinalizer::new()),
//!     )?;
//!
//!     let parent = heap.allocate_object(16, TypeTag(1), false)?;
//!     let child = heap.allocate(64)?;
//!     heap.write_reference(parent, 0, child)?;
//!     let root = roots.add(parent);
//!
//!     heap.collect(GcGeneration::Gen0)?;
//!
//!     // Objects may have moved; always go through the roots
//!     let parent = roots.get(root).unwrap();
//!     let child = heap.read_reference(parent, 0)?;
//!     assert!(heap.contains(child));
//!
//!     heap.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Mutator Threads                      │
//! │   allocate / write_reference (barrier) / pin / weak     │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ heap lock
//! ┌───────────────────────────▼─────────────────────────────┐
//! │  Trigger Controller ──► scope (Gen0 / Gen1 / Gen2)      │
//! │                             │                           │
//! │  Tracer ◄── roots + remembered set                      │
//! │     │                                                   │
//! │  Segregator ──► finalizer channel, weak table           │
//! │     │                                                   │
//! │  Compactor ──► rewrite slots, roots, tables; move bytes │
//! │     │                                                   │
//! │  Promotion ──► generation tags, remembered set refresh  │
//! └─────────────────────────────────────────────────────────┘
//!            ▲
//!            │ Start / Pause / Resume / Shutdown
//! ┌──────────┴──────────┐
//! │  Background marker  │  (quanta under the heap lock)
//! └─────────────────────┘
//! ```
//!
//! ## Collaborators
//!
//! The embedder supplies three capabilities:
//! - [`RootProvider`]: enumerates roots and accepts their new addresses
//! - [`TypeDescriptor`]: lists the reference slots of an object
//! - [`FinalizerChannel`]: runs finalizers and reports completion
//!
//! [`RootTable`], [`LayoutTable`], [`QueuedFinalizer`] and
//! [`ThreadedFinalizer`] are ready-made implementations.
//!
//! ## Rules for Mutators
//!
//! 1. **Root everything you keep**: unrooted objects may be collected
//! 2. **Store references through `write_reference`**: it is the write barrier
//! 3. **Re-read addresses after anything that may collect**: objects move
//! 4. **Pin before handing an address to foreign code**
//!
//! ## Modules
//!
//! - [`allocator`]: Generation spaces, large object heap, promotion
//! - [`config`]: Configuration parameters and validation
//! - [`error`]: Error types and the heap invariant check
//! - [`gc`]: Collection cycle orchestration
//! - [`heap`]: The mutator-facing heap and memory segments
//! - [`logging`]: Structured GC events
//! - [`marker`]: Roots, tracing, remembered set
//! - [`object`]: Headers, type descriptors, weak references
//! - [`relocate`]: Compaction and reference rewriting
//! - [`runtime`]: Trigger control, background marking, finalization, safepoints
//! - [`segregate`]: Live/garbage classification
//! - [`stats`]: Performance statistics

// Core GC modules
pub mod config;
pub mod error;
pub mod gc;
pub mod logging;

// Memory management subsystems
pub mod allocator;
pub mod heap;
pub mod object;

// GC algorithm components
pub mod marker;
pub mod relocate;
pub mod segregate;

// Runtime and monitoring
pub mod runtime;
pub mod stats;

// Re-export main types for convenience
pub use config::{ConfigError, GcConfig, LatencyMode};
pub use error::{GcError, Result};
pub use gc::CollectionReport;
pub use heap::{Heap, HeapStats, RequestOutcome};
pub use logging::{GcEvent, GcLogger, LogLevel};
pub use marker::{RootHandle, RootProvider, RootTable, RootType};
pub use object::{
    Address, GcGeneration, Generation, LayoutTable, SlotLayout, TypeDescriptor, TypeTag,
    WeakHandle, WeakReferenceEntry,
};
pub use relocate::RelocationMap;
pub use runtime::{
    BackgroundEvent, CollectorState, FinalizerChannel, FinalizerCompletion, QueuedFinalizer,
    ThreadedFinalizer,
};
pub use stats::{GcStats, GcSummary};

/// genheap version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
