//! Allocation tracking for the global allocator.

use parking_lot::{const_mutex, Mutex};
use std::collections::BTreeMap;

/// Stats from the engine's own tracking, independent of the OS view.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocationStats {
    /// Bytes currently allocated.
    pub used_memory: usize,
    /// Highest `used_memory` seen.
    pub max_used_memory: usize,
    /// Allocations not yet freed.
    pub num_alive_allocations: usize,
    /// Allocations since tracking started.
    pub num_total_allocations: usize,
}

/// Live allocations keyed by start address.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    live: BTreeMap<usize, usize>,
    stats: MemoryAllocationStats,
}

static GLOBAL_TRACKER: Mutex<MemoryTracker> = const_mutex(MemoryTracker::new());

/// The tracker fed by [`crate::GlobalAllocator`].
pub fn global_tracker() -> &'static Mutex<MemoryTracker> {
    &GLOBAL_TRACKER
}

/// Snapshot of the global tracker.
pub fn query_mem_tracking_stats() -> MemoryAllocationStats {
    GLOBAL_TRACKER.lock().stats()
}

impl MemoryTracker {
    pub const fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            stats: MemoryAllocationStats {
                used_memory: 0,
                max_used_memory: 0,
                num_alive_allocations: 0,
                num_total_allocations: 0,
            },
        }
    }

    pub fn track_alloc(&mut self, addr: usize, size: usize) {
        if let Some(stale) = self.live.insert(addr, size) {
            // The backend reused an address we never saw freed.
            tracing::warn!(addr, stale, "allocation tracked twice");
            self.stats.used_memory -= stale;
            self.stats.num_alive_allocations -= 1;
        }
        self.stats.used_memory += size;
        self.stats.max_used_memory = self.stats.max_used_memory.max(self.stats.used_memory);
        self.stats.num_alive_allocations += 1;
        self.stats.num_total_allocations += 1;
    }

    /// Returns the recorded size, or `None` for an unknown address.
    pub fn track_dealloc(&mut self, addr: usize) -> Option<usize> {
        let size = self.live.remove(&addr)?;
        self.stats.used_memory -= size;
        self.stats.num_alive_allocations -= 1;
        Some(size)
    }

    /// Whether `addr` falls inside any live allocation.
    pub fn owns(&self, addr: usize) -> bool {
        self.live
            .range(..=addr)
            .next_back()
            .is_some_and(|(&start, &size)| addr < start + size)
    }

    pub fn stats(&self) -> MemoryAllocationStats {
        self.stats
    }
}
