//! Advisory floating-point operation counter.
//!
//! Numerical kernels tick a process-global counter so solver drivers can
//! report rough work estimates. The counts are a side effect, not a
//! contract; nothing in the library reads them back.

use std::sync::atomic::{AtomicU64, Ordering};

static FLOPS: AtomicU64 = AtomicU64::new(0);

/// Add `n` floating-point operations to the process-global count.
#[inline]
pub fn add(n: u64) {
    FLOPS.fetch_add(n, Ordering::Relaxed);
}

/// Current process-global count.
#[inline]
pub fn count() -> u64 {
    FLOPS.load(Ordering::Relaxed)
}

/// Reset the count to zero.
#[inline]
pub fn reset() {
    FLOPS.store(0, Ordering::Relaxed);
}
