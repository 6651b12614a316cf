//! Debug allocator with construction/destruction instrumentation.
//!
//! Two implementations share one interface, selected at compile time:
//! - default: routes to [`GlobalAllocator`] and counts typed lifecycle calls
//! - `disable_debug_allocation`: every call is a no-op, `allocate` returns
//!   `None` and counters never move
//!
//! Counters live in an [`AllocCounters`] set. The allocator reports to the
//! process-wide set unless it is built over an explicit one, which keeps test
//! cases isolated from each other.

mod counters;

#[cfg(not(feature = "disable_debug_allocation"))]
mod instrumented;
#[cfg(feature = "disable_debug_allocation")]
mod stripped;

pub use counters::{AllocCounters, CounterSnapshot};

use crate::global::GlobalAllocator;

/// `GlobalAllocator` plus lifecycle counters.
#[derive(Debug, Clone, Copy)]
pub struct GlobalDebugAllocator<'c> {
    #[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
    inner: GlobalAllocator,
    counters: &'c AllocCounters,
}

impl GlobalDebugAllocator<'static> {
    /// Reports to [`AllocCounters::global`].
    pub fn new() -> Self {
        Self::with_counters(AllocCounters::global())
    }
}

impl Default for GlobalDebugAllocator<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'c> GlobalDebugAllocator<'c> {
    pub fn with_counters(counters: &'c AllocCounters) -> Self {
        Self {
            inner: GlobalAllocator,
            counters,
        }
    }

    pub fn counters(&self) -> &'c AllocCounters {
        self.counters
    }
}

/// Whether debug allocation is compiled in.
pub const fn is_enabled() -> bool {
    cfg!(not(feature = "disable_debug_allocation"))
}
