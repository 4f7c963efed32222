//! Weak References Support
//!
//! Weak references allow holding references to objects without preventing
//! garbage collection. When the referent is found unreachable the entry is
//! cleared (`is_alive = false`, `target = None`) and resolving the handle
//! yields `None` from then on.
//!
//! Two flavours:
//! - short: cleared as soon as the referent is unreachable from roots, even
//!   if it is about to be handed to the finalizer
//! - long (`track_resurrection`): kept while the referent is only reachable
//!   through the finalization queue
//!
//! Entries are processed during segregation and relocated with the heap.

use crate::error::{GcError, Result};
use crate::object::header::{Address, GcGeneration};
use crate::object::ObjectTable;
use crate::relocate::RelocationMap;

/// Handle to a weak reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeakHandle(u32);

impl WeakHandle {
    /// Raw handle value
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// One weak reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeakReferenceEntry {
    /// Referent, `None` once cleared
    pub target: Option<Address>,
    /// False once the referent has been found unreachable
    pub is_alive: bool,
    /// Survive while the referent awaits finalization
    pub track_resurrection: bool,
}

/// Table of weak references
///
/// Handles are slot indices; freed slots are reused.
#[derive(Debug, Default)]
pub struct WeakTable {
    entries: Vec<Option<WeakReferenceEntry>>,
    free: Vec<u32>,
}

impl WeakTable {
    /// Create new weak table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a weak reference to `target`
    pub fn register(&mut self, target: Address, track_resurrection: bool) -> WeakHandle {
        let entry = WeakReferenceEntry {
            target: Some(target),
            is_alive: true,
            track_resurrection,
        };

        match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(entry);
                WeakHandle(index)
            }
            None => {
                self.entries.push(Some(entry));
                WeakHandle((self.entries.len() - 1) as u32)
            }
        }
    }

    /// Current referent of a handle
    pub fn resolve(&self, handle: WeakHandle) -> Result<Option<Address>> {
        self.entry(handle).map(|entry| entry.target)
    }

    /// Entry behind a handle
    pub fn entry(&self, handle: WeakHandle) -> Result<&WeakReferenceEntry> {
        self.entries
            .get(handle.0 as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(GcError::InvalidWeakHandle { handle: handle.0 })
    }

    /// Release a handle
    pub fn free(&mut self, handle: WeakHandle) -> Result<()> {
        let slot = self
            .entries
            .get_mut(handle.0 as usize)
            .filter(|slot| slot.is_some())
            .ok_or(GcError::InvalidWeakHandle { handle: handle.0 })?;
        *slot = None;
        self.free.push(handle.0);
        Ok(())
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Check if no handles are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear entries whose condemned referent is unmarked
    ///
    /// `long` selects the resurrection-tracking entries; the others are left
    /// alone. Returns the number of entries cleared.
    pub fn clear_unreachable(
        &mut self,
        objects: &ObjectTable,
        scope: GcGeneration,
        long: bool,
    ) -> usize {
        let mut cleared = 0;
        for entry in self.entries.iter_mut().flatten() {
            if entry.track_resurrection != long {
                continue;
            }
            let Some(target) = entry.target else {
                continue;
            };
            let unreachable = match objects.get(target) {
                Some(header) => scope.condemns(header.generation) && !header.mark,
                None => true,
            };
            if unreachable {
                entry.target = None;
                entry.is_alive = false;
                cleared += 1;
            }
        }
        cleared
    }

    /// Rewrite referents that moved
    pub fn relocate(&mut self, map: &RelocationMap) {
        for entry in self.entries.iter_mut().flatten() {
            if let Some(target) = entry.target {
                entry.target = Some(map.forward(target));
            }
        }
    }

    /// Live referents, for heap verification
    pub(crate) fn targets(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.iter().flatten().filter_map(|entry| entry.target)
    }
}
