//! Generational Promotion - Survivor aging
//!
//! Based on the observation that:
//! - Most objects die young
//! - Objects that survive tend to live long
//!
//! Every survivor of a collection moves up one generation: Gen0 to Gen1,
//! Gen1 to Gen2. Gen2 and large objects stay where they are. The compactor
//! has already placed movable survivors in the target generation's space;
//! this module only updates the header tags, so pinned survivors are
//! promoted in metadata while remaining physically in place.

use crate::object::{Address, Generation, ObjectTable};

/// PromotionStats - result of one promotion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionStats {
    /// Objects whose generation increased
    pub promoted_objects: usize,
    /// Bytes whose generation increased
    pub promoted_bytes: usize,
    /// Bytes that arrived in Gen2
    pub promoted_to_gen2_bytes: usize,
}

/// PromotionPolicy - decides the generation of each survivor
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionPolicy;

impl PromotionPolicy {
    /// Create the policy
    pub fn new() -> Self {
        Self
    }

    /// Generation a survivor of `generation` ends up in
    pub fn target(&self, generation: Generation) -> Generation {
        generation.next()
    }

    /// Update the generation tag of every survivor
    ///
    /// `survivors` are post-compaction addresses.
    pub fn promote(&self, objects: &mut ObjectTable, survivors: &[Address]) -> PromotionStats {
        let mut stats = PromotionStats::default();

        for &addr in survivors {
            let Some(header) = objects.get_mut(addr) else {
                continue;
            };
            let from = header.generation;
            let to = self.target(from);
            crate::heap_invariant!(
                to.age() >= from.age(),
                "promotion would demote {:#x} from {} to {}",
                addr,
                from,
                to
            );
            if to != from {
                header.generation = to;
                stats.promoted_objects += 1;
                stats.promoted_bytes += header.size();
                if to == Generation::Gen2 {
                    stats.promoted_to_gen2_bytes += header.size();
                }
            }
        }

        stats
    }
}
