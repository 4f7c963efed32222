//! Page Helpers - System page size and alignment
//!
//! Segments are mapped in whole pages. The system page size is queried
//! once and cached.

use std::sync::atomic::{AtomicUsize, Ordering};

/// System page size (cached)
static SYSTEM_PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Get system page size dynamically
///
/// Returns actual system page size from OS.
/// Caches result for performance.
pub fn get_page_size() -> usize {
    let cached = SYSTEM_PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let size = page_size::get();
    SYSTEM_PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Align size to page boundary (round up)
pub fn align_to_page(size: usize) -> usize {
    let ps = get_page_size();
    (size + ps - 1) & !(ps - 1)
}

/// Check if address is page-aligned
pub fn is_page_aligned(addr: usize) -> bool {
    addr % get_page_size() == 0
}
