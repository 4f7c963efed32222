//! Trigger & Latency Controller
//!
//! Decides when to collect and how much of the heap to condemn.
//!
//! Decision inputs:
//! - Gen0 exhaustion: the normal reason to collect
//! - Survivor volume of recent Gen0 collections: escalates to Gen1
//! - Bytes that reached Gen2 or the LOH since the last Gen2, plus memory
//!   pressure reported by the embedder: escalates to Gen2
//!
//! The latency mode only scales these thresholds and chooses between a
//! background and a blocking Gen2. A no-GC region suspends every trigger
//! until its budget is used up or the caller exits it.

use crate::allocator::PromotionStats;
use crate::config::{GcConfig, LatencyMode};
use crate::error::{GcError, Result};
use crate::object::GcGeneration;
use std::fmt;

/// What the collector is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorState {
    /// No collection in progress
    Idle,
    /// Blocking Gen0 collection
    Gen0Collecting,
    /// Blocking Gen1 collection
    Gen1Collecting,
    /// Blocking Gen2 collection, or the final step of a background one
    Gen2Collecting,
    /// Gen2 marking is running on the background thread
    Gen2BackgroundMarking,
    /// Collections are suspended
    NoGcRegion,
}

impl CollectorState {
    /// Blocking state for a collection scope
    pub fn collecting(scope: GcGeneration) -> Self {
        match scope {
            GcGeneration::Gen0 => CollectorState::Gen0Collecting,
            GcGeneration::Gen1 => CollectorState::Gen1Collecting,
            GcGeneration::Gen2 => CollectorState::Gen2Collecting,
        }
    }
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectorState::Idle => "idle",
            CollectorState::Gen0Collecting => "gen0-collecting",
            CollectorState::Gen1Collecting => "gen1-collecting",
            CollectorState::Gen2Collecting => "gen2-collecting",
            CollectorState::Gen2BackgroundMarking => "gen2-background-marking",
            CollectorState::NoGcRegion => "no-gc-region",
        };
        write!(f, "{}", name)
    }
}

/// The allocation that is asking whether to collect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationContext {
    /// Requested size in bytes
    pub requested: usize,
    /// Whether the request goes to the LOH
    pub large: bool,
    /// Gen0 could not satisfy the request
    pub gen0_exhausted: bool,
    /// The LOH could not satisfy the request
    pub loh_exhausted: bool,
}

/// Result of charging an allocation against a no-GC budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCharge {
    /// No region is active
    Unlimited,
    /// Charged; the region continues
    Charged,
    /// The allocation would overdraw the budget; nothing was charged
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct NoGcBudget {
    budget: usize,
    used: usize,
}

/// TriggerController - collection trigger heuristics
#[derive(Debug)]
pub struct TriggerController {
    state: CollectorState,
    latency_mode: LatencyMode,
    background_gc: bool,

    gen1_survivor_threshold: usize,
    gen1_escalation_streak: u32,
    gen2_trigger_bytes: usize,
    loh_trigger_bytes: usize,

    /// Consecutive Gen0 collections that promoted above the threshold
    survivor_streak: u32,
    /// Bytes promoted into Gen2 or allocated on the LOH since the last Gen2
    bytes_since_gen2: usize,
    /// LOH bytes allocated since the last Gen2
    loh_bytes_since_gen2: usize,
    memory_pressure: usize,
    /// Pressure already accounted for by the last Gen2
    pressure_at_gen2: usize,

    no_gc: Option<NoGcBudget>,
}

impl TriggerController {
    /// Create a controller with the thresholds of `config`
    pub fn new(config: &GcConfig) -> Self {
        Self {
            state: CollectorState::Idle,
            latency_mode: config.latency_mode,
            background_gc: config.background_gc,
            gen1_survivor_threshold: config.gen1_survivor_threshold,
            gen1_escalation_streak: config.gen1_escalation_streak,
            gen2_trigger_bytes: config.gen2_trigger_bytes,
            loh_trigger_bytes: config.loh_trigger_bytes,
            survivor_streak: 0,
            bytes_since_gen2: 0,
            loh_bytes_since_gen2: 0,
            memory_pressure: 0,
            pressure_at_gen2: 0,
            no_gc: None,
        }
    }

    /// Current state
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Enter a collecting state, or return to `Idle`
    pub fn set_state(&mut self, state: CollectorState) {
        if self.state != state {
            log::trace!("collector state {} -> {}", self.state, state);
        }
        self.state = state;
    }

    /// Current latency mode
    pub fn latency_mode(&self) -> LatencyMode {
        self.latency_mode
    }

    /// Change the latency mode, returning the previous one
    pub fn set_latency_mode(&mut self, mode: LatencyMode) -> LatencyMode {
        std::mem::replace(&mut self.latency_mode, mode)
    }

    /// Decide whether an allocation should collect first, and what
    pub fn should_collect(&self, context: &AllocationContext) -> Option<GcGeneration> {
        if self.no_gc.is_some() {
            return None;
        }

        let background_running = self.state == CollectorState::Gen2BackgroundMarking;
        if context.loh_exhausted || (!background_running && self.gen2_due()) {
            return Some(GcGeneration::Gen2);
        }

        if context.gen0_exhausted {
            if self.survivor_streak >= self.gen1_escalation_streak {
                return Some(GcGeneration::Gen1);
            }
            return Some(GcGeneration::Gen0);
        }

        None
    }

    /// Whether the Gen2 heuristic has fired
    pub fn gen2_due(&self) -> bool {
        let scale = self.latency_mode.gen2_scale() as usize;
        let trigger = self.gen2_trigger_bytes.saturating_mul(scale);
        let pressure = self.memory_pressure.saturating_sub(self.pressure_at_gen2);
        self.bytes_since_gen2.saturating_add(pressure) >= trigger
            || self.loh_bytes_since_gen2 >= self.loh_trigger_bytes
    }

    /// Whether a Gen2 collection of this scope should mark in the background
    pub fn use_background(&self, scope: GcGeneration) -> bool {
        scope == GcGeneration::Gen2
            && self.background_gc
            && self.latency_mode.prefers_background()
            && self.no_gc.is_none()
    }

    /// Account for a successful allocation
    pub fn record_allocation(&mut self, size: usize, large: bool) {
        if large {
            self.bytes_since_gen2 = self.bytes_since_gen2.saturating_add(size);
            self.loh_bytes_since_gen2 = self.loh_bytes_since_gen2.saturating_add(size);
        }
    }

    /// Account for a finished collection
    pub fn record_collection(&mut self, scope: GcGeneration, promotion: &PromotionStats) {
        match scope {
            GcGeneration::Gen0 => {
                let threshold = self
                    .gen1_survivor_threshold
                    .saturating_mul(self.latency_mode.gen1_scale() as usize);
                if promotion.promoted_bytes > threshold {
                    self.survivor_streak += 1;
                } else {
                    self.survivor_streak = 0;
                }
                self.bytes_since_gen2 = self
                    .bytes_since_gen2
                    .saturating_add(promotion.promoted_to_gen2_bytes);
            }
            GcGeneration::Gen1 => {
                self.survivor_streak = 0;
                self.bytes_since_gen2 = self
                    .bytes_since_gen2
                    .saturating_add(promotion.promoted_to_gen2_bytes);
            }
            GcGeneration::Gen2 => {
                self.survivor_streak = 0;
                self.bytes_since_gen2 = 0;
                self.loh_bytes_since_gen2 = 0;
                self.pressure_at_gen2 = self.memory_pressure;
            }
        }
    }

    /// Consecutive high-survival Gen0 collections
    pub fn survivor_streak(&self) -> u32 {
        self.survivor_streak
    }

    /// Bytes counted towards the Gen2 trigger
    pub fn bytes_since_gen2(&self) -> usize {
        self.bytes_since_gen2
    }

    /// Add externally held memory to the Gen2 heuristic
    pub fn add_memory_pressure(&mut self, bytes: usize) {
        self.memory_pressure = self.memory_pressure.saturating_add(bytes);
    }

    /// Remove previously added memory pressure
    pub fn remove_memory_pressure(&mut self, bytes: usize) {
        self.memory_pressure = self.memory_pressure.saturating_sub(bytes);
        self.pressure_at_gen2 = self.pressure_at_gen2.min(self.memory_pressure);
    }

    /// Current memory pressure
    pub fn memory_pressure(&self) -> usize {
        self.memory_pressure
    }

    /// Enter a no-GC region guaranteeing `budget` bytes
    ///
    /// `available` is what the heap can provide without collecting.
    pub fn enter_no_gc_region(&mut self, budget: usize, available: usize) -> Result<()> {
        if self.no_gc.is_some() {
            return Err(GcError::NoGcRegionActive);
        }
        if budget == 0 {
            return Err(GcError::InvalidArgument(
                "no-GC region budget must be positive".to_string(),
            ));
        }
        if budget > available {
            return Err(GcError::InsufficientBudget {
                requested: budget,
                available,
            });
        }
        self.no_gc = Some(NoGcBudget { budget, used: 0 });
        self.set_state(CollectorState::NoGcRegion);
        Ok(())
    }

    /// Leave the no-GC region
    pub fn exit_no_gc_region(&mut self) -> Result<()> {
        if self.no_gc.take().is_none() {
            return Err(GcError::NotInNoGcRegion);
        }
        self.set_state(CollectorState::Idle);
        Ok(())
    }

    /// Whether a no-GC region is active
    pub fn in_no_gc_region(&self) -> bool {
        self.no_gc.is_some()
    }

    /// Bytes left in the active no-GC region
    pub fn no_gc_remaining(&self) -> Option<usize> {
        self.no_gc.map(|region| region.budget - region.used)
    }

    /// Charge an allocation against the no-GC budget
    pub fn charge(&mut self, size: usize) -> BudgetCharge {
        match self.no_gc.as_mut() {
            None => BudgetCharge::Unlimited,
            Some(region) if region.used.saturating_add(size) > region.budget => BudgetCharge::Exhausted,
            Some(region) => {
                region.used += size;
                BudgetCharge::Charged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KB, MB};

    fn controller() -> TriggerController {
        TriggerController::new(&GcConfig {
            gen1_survivor_threshold: 4 * KB,
            gen1_escalation_streak: 2,
            gen2_trigger_bytes: MB,
            loh_trigger_bytes: 2 * MB,
            ..Default::default()
        })
    }

    fn exhausted() -> AllocationContext {
        AllocationContext {
            requested: 64,
            gen0_exhausted: true,
            ..Default::default()
        }
    }

    fn promoted(bytes: usize) -> PromotionStats {
        PromotionStats {
            promoted_objects: 1,
            promoted_bytes: bytes,
            promoted_to_gen2_bytes: 0,
        }
    }

    #[test]
    fn test_gen0_on_exhaustion() {
        let trigger = controller();
        assert_eq!(trigger.should_collect(&AllocationContext::default()), None);
        assert_eq!(trigger.should_collect(&exhausted()), Some(GcGeneration::Gen0));
    }

    #[test]
    fn test_escalates_to_gen1_after_streak() {
        let mut trigger = controller();
        trigger.record_collection(GcGeneration::Gen0, &promoted(8 * KB));
        assert_eq!(trigger.should_collect(&exhausted()), Some(GcGeneration::Gen0));
        trigger.record_collection(GcGeneration::Gen0, &promoted(8 * KB));
        assert_eq!(trigger.should_collect(&exhausted()), Some(GcGeneration::Gen1));

        trigger.record_collection(GcGeneration::Gen1, &promoted(0));
        assert_eq!(trigger.should_collect(&exhausted()), Some(GcGeneration::Gen0));
    }

    #[test]
    fn test_low_survival_breaks_streak() {
        let mut trigger = controller();
        trigger.record_collection(GcGeneration::Gen0, &promoted(8 * KB));
        trigger.record_collection(GcGeneration::Gen0, &promoted(KB));
        assert_eq!(trigger.survivor_streak(), 0);
    }

    #[test]
    fn test_low_latency_scales_gen1_threshold() {
        let mut trigger = controller();
        trigger.set_latency_mode(LatencyMode::LowLatency);
        trigger.record_collection(GcGeneration::Gen0, &promoted(6 * KB));
        assert_eq!(trigger.survivor_streak(), 0);
        trigger.record_collection(GcGeneration::Gen0, &promoted(9 * KB));
        assert_eq!(trigger.survivor_streak(), 1);
    }

    #[test]
    fn test_gen2_by_pressure_and_scale() {
        let mut trigger = controller();
        trigger.add_memory_pressure(MB);
        assert!(trigger.gen2_due());
        assert_eq!(
            trigger.should_collect(&AllocationContext::default()),
            Some(GcGeneration::Gen2)
        );

        trigger.set_latency_mode(LatencyMode::LowLatency);
        assert!(!trigger.gen2_due());

        trigger.set_latency_mode(LatencyMode::Interactive);
        trigger.record_collection(GcGeneration::Gen2, &PromotionStats::default());
        assert!(!trigger.gen2_due());

        trigger.remove_memory_pressure(usize::MAX);
        assert_eq!(trigger.memory_pressure(), 0);
    }

    #[test]
    fn test_gen2_by_loh_allocation() {
        let mut trigger = controller();
        trigger.record_allocation(2 * MB, true);
        assert!(trigger.gen2_due());
        trigger.record_collection(GcGeneration::Gen2, &PromotionStats::default());
        assert!(!trigger.gen2_due());
    }

    #[test]
    fn test_loh_exhaustion_collects_gen2() {
        let trigger = controller();
        let context = AllocationContext {
            requested: 100 * KB,
            large: true,
            loh_exhausted: true,
            ..Default::default()
        };
        assert_eq!(trigger.should_collect(&context), Some(GcGeneration::Gen2));
    }

    #[test]
    fn test_background_choice() {
        let mut trigger = controller();
        assert!(trigger.use_background(GcGeneration::Gen2));
        assert!(!trigger.use_background(GcGeneration::Gen0));
        trigger.set_latency_mode(LatencyMode::Batch);
        assert!(!trigger.use_background(GcGeneration::Gen2));
    }

    #[test]
    fn test_no_gc_region() {
        let mut trigger = controller();
        assert!(matches!(
            trigger.enter_no_gc_region(2 * KB, KB),
            Err(GcError::InsufficientBudget { .. })
        ));
        trigger.enter_no_gc_region(KB, 4 * KB).unwrap();
        assert!(matches!(
            trigger.enter_no_gc_region(KB, 4 * KB),
            Err(GcError::NoGcRegionActive)
        ));
        assert_eq!(trigger.state(), CollectorState::NoGcRegion);
        assert_eq!(trigger.should_collect(&exhausted()), None);

        assert_eq!(trigger.charge(512), BudgetCharge::Charged);
        assert_eq!(trigger.no_gc_remaining(), Some(512));
        assert_eq!(trigger.charge(1024), BudgetCharge::Exhausted);
        assert_eq!(trigger.no_gc_remaining(), Some(512));

        trigger.exit_no_gc_region().unwrap();
        assert!(matches!(trigger.exit_no_gc_region(), Err(GcError::NotInNoGcRegion)));
        assert_eq!(trigger.charge(1024), BudgetCharge::Unlimited);
        assert_eq!(trigger.state(), CollectorState::Idle);
    }
}
