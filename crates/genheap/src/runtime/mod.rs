//! Runtime Module - Collector runtime services
//!
//! Everything around the collection pipeline that has a lifecycle of its
//! own:
//! - Trigger and latency control
//! - Background marking thread
//! - Finalization queue and finalizer executors
//! - Deferred collection requests served at safepoints

pub mod background;
pub mod finalizer;
pub mod safepoint;
pub mod trigger;

pub use background::{BackgroundCommand, BackgroundCoordinator, BackgroundEvent, MarkProgress};
pub use finalizer::{
    FinalizationEntry, FinalizationQueue, FinalizerChannel, FinalizerCompletion, QueuedFinalizer,
    ThreadedFinalizer,
};
pub use safepoint::Safepoint;
pub use trigger::{AllocationContext, BudgetCharge, CollectorState, TriggerController};

pub use crate::config::LatencyMode;
