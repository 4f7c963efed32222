//! Safepoint Management
//!
//! Every heap operation takes the heap lock, so each one is already a point
//! where collection may happen. Safepoints add a cooperative path: an
//! advisory collection request that cannot run right away is parked here and
//! executed the next time a mutator calls `Heap::safepoint()`.
//!
//! ## Request States
//!
//! ```text
//! NONE (0) ──request──► PENDING(gen) ──request(older)──► PENDING(older gen)
//!    ▲                       │
//!    └────────take───────────┘
//! ```
//!
//! Concurrent requests merge to the oldest requested generation.

use crate::object::GcGeneration;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// No collection is pending
pub const SAFEPOINT_NONE: u8 = 0;

/// Safepoint - parked collection requests
///
/// Lock-free: request and take are single atomic operations.
#[derive(Debug, Default)]
pub struct Safepoint {
    /// `SAFEPOINT_NONE`, or the pending generation index plus one
    state: AtomicU8,
    /// Number of safepoint polls
    polls: AtomicU64,
    /// Number of parked requests executed
    served: AtomicU64,
}

impl Safepoint {
    /// Create safepoint with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a collection request
    ///
    /// Merges with an already parked request, keeping the older generation.
    pub fn request(&self, generation: GcGeneration) {
        let encoded = generation.index() as u8 + 1;
        self.state.fetch_max(encoded, Ordering::AcqRel);
    }

    /// Check if a request is parked
    pub fn is_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != SAFEPOINT_NONE
    }

    /// Parked request, without taking it
    pub fn pending(&self) -> Option<GcGeneration> {
        Self::decode(self.state.load(Ordering::Acquire))
    }

    /// Take the parked request, leaving nothing pending
    pub fn take(&self) -> Option<GcGeneration> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let taken = Self::decode(self.state.swap(SAFEPOINT_NONE, Ordering::AcqRel));
        if taken.is_some() {
            self.served.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Drop a parked request
    pub fn cancel(&self) {
        self.state.store(SAFEPOINT_NONE, Ordering::Release);
    }

    /// Number of polls so far
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Number of parked requests served
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    fn decode(state: u8) -> Option<GcGeneration> {
        match state {
            SAFEPOINT_NONE => None,
            encoded => GcGeneration::from_index(encoded as usize - 1),
        }
    }
}
