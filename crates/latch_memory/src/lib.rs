//! Latch Engine Memory
//!
//! Tiered allocators that sit beneath every engine subsystem:
//! - `Heap` - fixed region reserved once at startup
//! - `BuddyAllocator` - power-of-two splitting/merging over an owned heap
//! - `StackAllocator` - bump allocation with rewindable marks
//! - `BlockAllocator` / `CircularAllocator` - fixed-size pools and ring buffers
//! - `GlobalAllocator` / `GlobalDebugAllocator` - routing over the process allocator
//! - `GlobalSingleFrameAllocator` / `GlobalScratchAllocator` - engine-owned heaps
//!
//! # Feature Flags
//!
//! - `mem_tracking` - record global allocations (default: enabled)
//! - `disable_debug_allocation` - compile the debug allocator down to no-ops
//!
//! None of the allocators lock internally. One instance belongs to one owner.

pub mod allocator;
pub mod block;
pub mod buddy;
pub mod circular;
pub mod debug;
pub mod engine;
pub mod error;
pub mod frame;
pub mod global;
pub mod heap;
pub mod stack;

#[cfg(feature = "mem_tracking")]
pub mod tracking;

pub use allocator::{Allocator, MAX_ALIGN};
pub use block::BlockAllocator;
pub use buddy::BuddyAllocator;
pub use circular::CircularAllocator;
pub use debug::{AllocCounters, CounterSnapshot, GlobalDebugAllocator};
pub use engine::{EngineGlobals, EngineHeapConfig, FrameInfo};
pub use error::AllocError;
pub use frame::{GlobalScratchAllocator, GlobalSingleFrameAllocator};
pub use global::GlobalAllocator;
pub use heap::{Heap, HEAP_ALIGNMENT};
pub use stack::{OverflowPolicy, StackAllocator, StackMark};

#[cfg(feature = "mem_tracking")]
pub use tracking::{query_mem_tracking_stats, MemoryAllocationStats, MemoryTracker};

// ============================================================================
// No-op stubs when tracking disabled
// ============================================================================

#[cfg(not(feature = "mem_tracking"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocationStats {
    pub used_memory: usize,
    pub max_used_memory: usize,
    pub num_alive_allocations: usize,
    pub num_total_allocations: usize,
}

#[cfg(not(feature = "mem_tracking"))]
pub fn query_mem_tracking_stats() -> MemoryAllocationStats {
    MemoryAllocationStats::default()
}

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience for byte budgets written as kibibytes.
pub const fn kib(n: usize) -> usize {
    n * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn kib_scales_by_1024() {
        assert_eq!(kib(4), 4096);
    }
}
