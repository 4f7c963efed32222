//! Root Management - GC Root Identification
//!
//! Roots are starting points for marking. All objects reachable
//! from roots must be marked as live.
//!
//! The collector does not scan stacks or registers itself. It is handed a
//! [`RootProvider`] that enumerates the current roots at the start of every
//! cycle and is told where objects moved at the end of it.
//!
//! # Root Types
//!
//! 1. **Stack Roots** - Locals the embedder keeps alive for a frame
//! 2. **Global Roots** - Statics and module-level values
//! 3. **Handle Roots** - Strong handles held by native code
//!
//! # Thread Safety
//!
//! [`RootTable`] guards its slots with a mutex, so handles can be added,
//! updated and removed from any thread while the heap is running.

use crate::object::Address;
use crate::relocate::RelocationMap;
use parking_lot::Mutex;
use std::fmt;

/// Root enumeration capability supplied by the embedder
///
/// Called by the collector with the heap lock held; implementations must not
/// call back into the heap.
pub trait RootProvider: Send + Sync {
    /// Every address the mutator holds that must keep an object alive
    ///
    /// Null (`0`) entries are ignored.
    fn enumerate_roots(&self) -> Vec<Address>;

    /// Rewrite held addresses after compaction
    fn relocate_roots(&self, map: &RelocationMap);
}

/// Root types for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootType {
    /// Stack roots (local variables, parameters)
    Stack,
    /// Global/static variables
    Global,
    /// Strong handles held by native code
    Handle,
}

impl fmt::Display for RootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootType::Stack => write!(f, "Stack"),
            RootType::Global => write!(f, "Global"),
            RootType::Handle => write!(f, "Handle"),
        }
    }
}

/// Handle to a root slot in a [`RootTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle(usize);

#[derive(Debug)]
struct RootSlot {
    address: Address,
    root_type: RootType,
}

#[derive(Debug, Default)]
struct RootSlots {
    slots: Vec<Option<RootSlot>>,
    free: Vec<usize>,
}

/// RootTable - handle-based [`RootProvider`]
///
/// Each handle owns one slot holding an address. The collector reads every
/// non-null slot as a root and rewrites slots when objects move, so a handle
/// always resolves to the object's current address.
///
/// # Examples
///
/// ```rust
/// use genheap::{RootProvider, RootTable};
///
/// let roots = RootTable::new();
/// let handle = roots.add(0x1000);
/// assert_eq!(roots.get(handle), Some(0x1000));
/// assert_eq!(roots.enumerate_roots(), vec![0x1000]);
///
/// roots.set(handle, 0);
/// assert!(roots.enumerate_roots().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RootTable {
    inner: Mutex<RootSlots>,
}

impl RootTable {
    /// Create an empty root table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle root
    pub fn add(&self, address: Address) -> RootHandle {
        self.add_typed(address, RootType::Handle)
    }

    /// Add a root of a given type
    pub fn add_typed(&self, address: Address, root_type: RootType) -> RootHandle {
        let mut inner = self.inner.lock();
        let slot = Some(RootSlot { address, root_type });
        match inner.free.pop() {
            Some(index) => {
                inner.slots[index] = slot;
                RootHandle(index)
            }
            None => {
                inner.slots.push(slot);
                RootHandle(inner.slots.len() - 1)
            }
        }
    }

    /// Current address held by a handle
    ///
    /// `None` for removed handles and null slots.
    pub fn get(&self, handle: RootHandle) -> Option<Address> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.address)
            .filter(|&addr| addr != 0)
    }

    /// Overwrite the address held by a handle; `0` clears it
    ///
    /// Returns false if the handle was removed.
    pub fn set(&self, handle: RootHandle, address: Address) -> bool {
        let mut inner = self.inner.lock();
        match inner.slots.get_mut(handle.0).and_then(|slot| slot.as_mut()) {
            Some(slot) => {
                slot.address = address;
                true
            }
            None => false,
        }
    }

    /// Remove a handle, returning what it held
    pub fn remove(&self, handle: RootHandle) -> Option<Address> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(handle.0)?.take()?;
        inner.free.push(handle.0);
        Some(slot.address).filter(|&addr| addr != 0)
    }

    /// Remove every root
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.free.clear();
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.len() - inner.free.len()
    }

    /// Check if the table holds no handles
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handle count per root type
    pub fn count_by_type(&self, root_type: RootType) -> usize {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.root_type == root_type)
            .count()
    }
}

impl RootProvider for RootTable {
    fn enumerate_roots(&self) -> Vec<Address> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.address)
            .filter(|&addr| addr != 0)
            .collect()
    }

    fn relocate_roots(&self, map: &RelocationMap) {
        let mut inner = self.inner.lock();
        for slot in inner.slots.iter_mut().flatten() {
            slot.address = map.forward(slot.address);
        }
    }
}
