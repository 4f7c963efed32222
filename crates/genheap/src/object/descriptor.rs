//! Type Descriptor - Where reference slots live inside a payload
//!
//! The collector never interprets object layouts itself. For every object it
//! asks the embedder's [`TypeDescriptor`] which payload offsets hold
//! references. Each reference slot is 8 bytes, little-endian, `0` meaning
//! null.
//!
//! # Layout
//!
//! ```text
//! Payload of a tag registered as Fixed([0, 16]):
//! ┌─────────┬─────────┬─────────┬─────────┐
//! │ 0-7     │ 8-15    │ 16-23   │ 24-31   │
//! │ ref     │ data    │ ref     │ data    │
//! └─────────┴─────────┴─────────┴─────────┘
//! ```

use crate::object::header::{TypeTag, REFERENCE_SIZE};
use std::borrow::Cow;
use std::collections::HashMap;

/// Reference enumeration capability supplied by the embedder
pub trait TypeDescriptor: Send + Sync {
    /// Payload offsets of the reference slots of an object
    ///
    /// Every returned offset must be 8-byte aligned and satisfy
    /// `offset + 8 <= size`.
    fn reference_offsets(&self, tag: TypeTag, size: usize) -> Cow<'_, [usize]>;
}

/// Slot layout of one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLayout {
    /// No reference slots
    Leaf,
    /// References at fixed payload offsets
    Fixed(Vec<usize>),
    /// Every 8-byte word is a reference (arrays of references)
    AllSlots,
}

/// Table-driven [`TypeDescriptor`]
///
/// Layouts are registered up front and the table is immutable once shared.
/// Unregistered tags, including [`TypeTag::LEAF`], have no reference slots.
///
/// # Example
///
/// ```rust
/// use genheap::{LayoutTable, SlotLayout, TypeDescriptor, TypeTag};
///
/// let mut layouts = LayoutTable::new();
/// layouts.register(TypeTag(1), SlotLayout::Fixed(vec![0, 16]));
///
/// assert_eq!(&*layouts.reference_offsets(TypeTag(1), 32), &[0, 16]);
/// assert!(layouts.reference_offsets(TypeTag::LEAF, 32).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    layouts: HashMap<TypeTag, SlotLayout>,
}

impl LayoutTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the layout of a tag, replacing any previous one
    ///
    /// Fixed offsets are sorted, deduplicated and aligned down to a slot
    /// boundary.
    pub fn register(&mut self, tag: TypeTag, layout: SlotLayout) -> &mut Self {
        let layout = match layout {
            SlotLayout::Fixed(mut offsets) => {
                for offset in offsets.iter_mut() {
                    *offset -= *offset % REFERENCE_SIZE;
                }
                offsets.sort_unstable();
                offsets.dedup();
                SlotLayout::Fixed(offsets)
            }
            other => other,
        };
        self.layouts.insert(tag, layout);
        self
    }

    /// Layout registered for a tag
    pub fn layout(&self, tag: TypeTag) -> Option<&SlotLayout> {
        self.layouts.get(&tag)
    }
}

impl TypeDescriptor for LayoutTable {
    fn reference_offsets(&self, tag: TypeTag, size: usize) -> Cow<'_, [usize]> {
        match self.layouts.get(&tag) {
            None | Some(SlotLayout::Leaf) => Cow::Borrowed(&[]),
            Some(SlotLayout::Fixed(offsets)) => {
                if offsets.iter().all(|&off| off + REFERENCE_SIZE <= size) {
                    Cow::Borrowed(offsets.as_slice())
                } else {
                    Cow::Owned(
                        offsets
                            .iter()
                            .copied()
                            .filter(|&off| off + REFERENCE_SIZE <= size)
                            .collect(),
                    )
                }
            }
            Some(SlotLayout::AllSlots) => Cow::Owned(
                (0..size / REFERENCE_SIZE)
                    .map(|slot| slot * REFERENCE_SIZE)
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_tag_is_leaf() {
        let table = LayoutTable::new();
        assert!(table.reference_offsets(TypeTag(42), 64).is_empty());
    }

    #[test]
    fn test_fixed_layout_normalized() {
        let mut table = LayoutTable::new();
        table.register(TypeTag(1), SlotLayout::Fixed(vec![17, 0, 16]));
        assert_eq!(&*table.reference_offsets(TypeTag(1), 24), &[0, 16]);
    }

    #[test]
    fn test_fixed_layout_truncated_by_size() {
        let mut table = LayoutTable::new();
        table.register(TypeTag(1), SlotLayout::Fixed(vec![0, 24]));
        assert_eq!(&*table.reference_offsets(TypeTag(1), 16), &[0]);
    }

    #[test]
    fn test_all_slots() {
        let mut table = LayoutTable::new();
        table.register(TypeTag(2), SlotLayout::AllSlots);
        assert_eq!(&*table.reference_offsets(TypeTag(2), 20), &[0, 8]);
    }
}
