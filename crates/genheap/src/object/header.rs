//! Object Header - Metadata for GC-managed objects
//!
//! Headers live in a side table owned by the collector, keyed by the
//! object's payload address. The payload itself carries no metadata, so the
//! mutator sees exactly `size` bytes at the address it was handed.
//!
//! ```text
//! ObjectTable (BTreeMap, address ordered)
//! ┌──────────────┬────────────────────────────────────────────┐
//! │ 0x7f..1000   │ size | gen | mark | pins | fin | fwd | tag  │
//! │ 0x7f..1040   │ ...                                        │
//! └──────────────┴────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of an object's payload
///
/// Addresses point into memory-mapped segments. `0` is the null reference.
pub type Address = usize;

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = 8;

/// Size of a reference slot in a payload
pub const REFERENCE_SIZE: usize = 8;

/// Round a size up to the object alignment
#[inline]
pub fn align_size(size: usize) -> usize {
    (size + OBJECT_ALIGNMENT - 1) & !(OBJECT_ALIGNMENT - 1)
}

/// Minimal type identity handed to the [`TypeDescriptor`](crate::object::TypeDescriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TypeTag(pub u32);

impl TypeTag {
    /// Tag with no reference slots
    pub const LEAF: TypeTag = TypeTag(0);
}

/// Generation an object belongs to
///
/// `Large` objects live on the large object heap and age like Gen2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    Gen0,
    Gen1,
    Gen2,
    Large,
}

impl Generation {
    /// Age used for remembered-set and condemnation decisions
    #[inline]
    pub fn age(self) -> u8 {
        match self {
            Generation::Gen0 => 0,
            Generation::Gen1 => 1,
            Generation::Gen2 | Generation::Large => 2,
        }
    }

    /// Generation a survivor is promoted to
    #[inline]
    pub fn next(self) -> Generation {
        match self {
            Generation::Gen0 => Generation::Gen1,
            Generation::Gen1 | Generation::Gen2 => Generation::Gen2,
            Generation::Large => Generation::Large,
        }
    }

    /// Index of the small-object space for this generation
    #[inline]
    pub(crate) fn space_index(self) -> Option<usize> {
        match self {
            Generation::Gen0 => Some(0),
            Generation::Gen1 => Some(1),
            Generation::Gen2 => Some(2),
            Generation::Large => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Gen0 => write!(f, "Gen0"),
            Generation::Gen1 => write!(f, "Gen1"),
            Generation::Gen2 => write!(f, "Gen2"),
            Generation::Large => write!(f, "LOH"),
        }
    }
}

/// Collection scope
///
/// Collecting generation N condemns every generation up to and including N.
/// `Gen2` condemns the large object heap as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GcGeneration {
    Gen0 = 0,
    Gen1 = 1,
    Gen2 = 2,
}

impl GcGeneration {
    /// All scopes, youngest first
    pub const ALL: [GcGeneration; 3] = [GcGeneration::Gen0, GcGeneration::Gen1, GcGeneration::Gen2];

    /// Numeric index of the scope
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Scope from a numeric index
    pub fn from_index(index: usize) -> Option<GcGeneration> {
        match index {
            0 => Some(GcGeneration::Gen0),
            1 => Some(GcGeneration::Gen1),
            2 => Some(GcGeneration::Gen2),
            _ => None,
        }
    }

    /// Whether objects of `generation` are collected in this scope
    #[inline]
    pub fn condemns(self, generation: Generation) -> bool {
        generation.age() <= self as u8
    }
}

impl fmt::Display for GcGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen{}", self.index())
    }
}

/// Object Header
///
/// Collector-owned metadata for one object.
/// - `mark` is only set between tracing and segregation, or for objects
///   allocated black during background marking
/// - `forwarding` is only set between planning and the end of compaction
/// - an object with `pin_count > 0` is never relocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Payload size in bytes (aligned)
    pub size: u32,
    /// Generation tag
    pub generation: Generation,
    /// Mark bit
    pub mark: bool,
    /// Outstanding pins
    pub pin_count: u16,
    /// Object must be handed to the finalizer channel before reclamation
    pub has_finalizer: bool,
    /// New address planned by the compactor
    pub forwarding: Option<Address>,
    /// Type identity for reference enumeration
    pub type_tag: TypeTag,
}

impl ObjectHeader {
    /// Create new object header
    pub fn new(size: u32, generation: Generation, type_tag: TypeTag, has_finalizer: bool) -> Self {
        Self {
            size,
            generation,
            mark: false,
            pin_count: 0,
            has_finalizer,
            forwarding: None,
            type_tag,
        }
    }

    /// Payload size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Check if object is pinned
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    /// Check if object lives on the large object heap
    #[inline]
    pub fn is_large(&self) -> bool {
        self.generation == Generation::Large
    }
}
