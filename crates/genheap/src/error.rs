//! Error Module - genheap Error Types
//!
//! Defines all error types returned by the collector.
//!
//! # Error Categories
//!
//! ## Allocation Errors
//! - `AllocationFailure` - Heap exhausted after one collection attempt
//! - `InsufficientBudget` - A no-GC region cannot be guaranteed
//!
//! ## Mutator Contract Violations
//! - `InvalidPinHandle` / `DoubleUnpin` / `PinCountOverflow`
//! - `InvalidAddress` / `InvalidSlot` / `InvalidWeakHandle`
//!
//! ## Controller Errors
//! - `NoGcRegionActive` / `NotInNoGcRegion`
//!
//! ## Setup Errors
//! - `Configuration` / `VirtualMemory` / `Thread`
//!
//! Heap-consistency violations are not errors: they go through
//! [`heap_invariant!`](crate::heap_invariant) and abort the collector.

use thiserror::Error;

/// Main error type for all heap operations
///
/// # Examples
///
/// ```rust
/// use genheap::GcError;
///
/// fn handle_error(err: GcError) {
///     match err {
///         GcError::AllocationFailure { requested, available } => {
///             eprintln!("heap exhausted: requested {}, available {}", requested, available);
///         }
///         GcError::InsufficientBudget { .. } => {
///             eprintln!("continuing without a no-GC guarantee");
///         }
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcError {
    /// Heap exhausted after a collection attempt
    ///
    /// **When returned:** Gen0 or the LOH cannot satisfy a request even after one
    /// collection and after growing up to the configured caps.
    ///
    /// **Recovery strategy:** Release references and retry, or raise `max_heap_size`
    #[error("Allocation failure: requested {requested} bytes, available {available} bytes")]
    AllocationFailure { requested: usize, available: usize },

    /// No-GC region request cannot be honored
    ///
    /// **When returned:** `try_enter_no_gc_region` asks for more bytes than the heap
    /// can guarantee without collecting.
    ///
    /// **Recovery strategy:** Proceed without the guarantee or ask for less
    #[error("Insufficient budget for no-GC region: requested {requested} bytes, available {available} bytes")]
    InsufficientBudget { requested: usize, available: usize },

    /// Pin or unpin of an address that is not a live object
    #[error("Invalid pin handle: {address:#x} is not a live object")]
    InvalidPinHandle { address: usize },

    /// Unpin of an object whose pin count is already zero
    #[error("Double unpin of object {address:#x}")]
    DoubleUnpin { address: usize },

    /// Pin count would exceed u16::MAX
    #[error("Pin count overflow on object {address:#x}")]
    PinCountOverflow { address: usize },

    /// Address does not name a live managed object
    #[error("Invalid address: {address:#x} is not a live object")]
    InvalidAddress { address: usize },

    /// Payload access outside the object or at a non-reference slot
    #[error("Invalid slot: offset {offset} on object {address:#x}")]
    InvalidSlot { address: usize, offset: usize },

    /// Weak handle was never issued or has been freed
    #[error("Invalid weak handle: {handle}")]
    InvalidWeakHandle { handle: u32 },

    /// Operation not permitted while a no-GC region is active
    #[error("A no-GC region is active")]
    NoGcRegionActive,

    /// Exit requested but no no-GC region is active
    #[error("No no-GC region is active")]
    NotInNoGcRegion,

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Zero-size allocation
    /// - Allocation larger than `u32::MAX`
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    ///
    /// **When returned:** `GcConfig::validate` rejected the configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Virtual memory error
    ///
    /// **When returned:** Mapping a new segment failed
    #[error("Virtual memory error: {0}")]
    VirtualMemory(String),

    /// Collector thread could not be started
    ///
    /// **When returned:** Spawning the background marker or a finalizer
    /// thread failed
    #[error("Thread error: {0}")]
    Thread(String),

    /// Operation timeout
    ///
    /// **When returned:** A bounded wait on the background collector or the
    /// finalizer did not finish in time
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl GcError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GcError::AllocationFailure { .. }
                | GcError::InsufficientBudget { .. }
                | GcError::NoGcRegionActive
                | GcError::Timeout(_)
        )
    }

    /// Check if this error is a mutator-side contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            GcError::InvalidPinHandle { .. }
                | GcError::DoubleUnpin { .. }
                | GcError::PinCountOverflow { .. }
                | GcError::InvalidAddress { .. }
                | GcError::InvalidSlot { .. }
                | GcError::InvalidWeakHandle { .. }
        )
    }
}

/// Result type alias for heap operations
pub type Result<T> = std::result::Result<T, GcError>;

/// Abort on a heap-consistency violation
///
/// The collector cannot keep running on a heap that may be corrupt, so this
/// logs at error level and panics instead of returning.
#[macro_export]
macro_rules! heap_invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::error::invariant_failed(stringify!($cond), format!($($arg)*));
        }
    };
}

/// Log and panic on a violated heap invariant
#[doc(hidden)]
#[cold]
pub fn invariant_failed(condition: &str, message: String) -> ! {
    log::error!("heap invariant violated ({}): {}", condition, message);
    panic!("heap invariant violated ({}): {}", condition, message);
}
