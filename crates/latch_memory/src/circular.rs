//! Ring-buffer allocator.
//!
//! Like a stack allocator, but when a request does not fit behind the cursor
//! it wraps around to the front of the budget and overwrites whatever was
//! there. Callers use it for data that only has to outlive a few requests.

use crate::allocator::{align_up, Allocator, MAX_ALIGN};
use crate::error::AllocError;
use crate::global::GlobalAllocator;
use std::alloc::Layout;
use std::ptr::NonNull;

pub struct CircularAllocator<P: Allocator = GlobalAllocator> {
    parent: P,
    base: NonNull<u8>,
    budget: Layout,
    cursor: usize,
    peak: usize,
    wraps: usize,
}

// SAFETY: the budget is exclusively owned by this allocator until drop.
unsafe impl<P: Allocator + Send> Send for CircularAllocator<P> {}

impl<P: Allocator + Default> CircularAllocator<P> {
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Self::with_parent(capacity, P::default())
    }
}

impl<P: Allocator> CircularAllocator<P> {
    pub fn with_parent(capacity: usize, mut parent: P) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::InvalidCapacity { capacity });
        }
        let budget = Layout::from_size_align(capacity, MAX_ALIGN)
            .map_err(|_| AllocError::InvalidCapacity { capacity })?;
        let base = parent
            .allocate(budget)
            .ok_or(AllocError::ReservationFailed { size: capacity })?;

        tracing::debug!(capacity, "circular allocator reserved budget");
        Ok(Self {
            parent,
            base,
            budget,
            cursor: 0,
            peak: 0,
            wraps: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.budget.size()
    }

    /// Bytes issued since the last wrap or reset.
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Furthest the cursor has reached into the ring.
    #[inline]
    pub fn high_water_mark(&self) -> usize {
        self.peak
    }

    /// How many times the cursor has wrapped back to the front.
    #[inline]
    pub fn wrap_count(&self) -> usize {
        self.wraps
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Offset where a `layout` request would start if issued from `from`.
    fn fit_from(&self, from: usize, layout: Layout) -> Option<usize> {
        let base_addr = self.base.as_ptr() as usize;
        let start = align_up(base_addr + from, layout.align())? - base_addr;
        let end = start.checked_add(layout.size())?;
        (end <= self.capacity()).then_some(start)
    }
}

impl<P: Allocator> Allocator for CircularAllocator<P> {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let start = match self.fit_from(self.cursor, layout) {
            Some(start) => start,
            None => {
                let Some(start) = self.fit_from(0, layout) else {
                    tracing::warn!(
                        size = layout.size(),
                        capacity = self.capacity(),
                        "request larger than circular allocator"
                    );
                    return None;
                };
                self.wraps += 1;
                tracing::trace!(wraps = self.wraps, "circular allocator wrapped");
                start
            }
        };

        self.cursor = start + layout.size();
        self.peak = self.peak.max(self.cursor);
        // SAFETY: start + size <= capacity, inside the reserved budget.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        debug_assert!(
            self.has_allocated_ptr(ptr.as_ptr()),
            "pointer {ptr:p} was not allocated by this circular allocator"
        );
    }

    fn max_size(&self) -> usize {
        self.capacity()
    }

    /// Range check over the whole budget; wrapped data is still "ours".
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        (ptr as usize)
            .checked_sub(self.base.as_ptr() as usize)
            .is_some_and(|offset| offset < self.capacity())
    }
}

impl<P: Allocator> Drop for CircularAllocator<P> {
    fn drop(&mut self) {
        // SAFETY: base was reserved from parent with this exact layout.
        unsafe { self.parent.deallocate(self.base, self.budget) };
    }
}

impl<P: Allocator> std::fmt::Debug for CircularAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularAllocator")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .field("peak", &self.peak)
            .field("wraps", &self.wraps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn test_wraps_to_front() {
        let mut ring = CircularAllocator::<GlobalAllocator>::new(64).unwrap();
        let first = ring.allocate_bytes(32).unwrap();
        let _second = ring.allocate_bytes(16).unwrap();
        assert_eq!(ring.wrap_count(), 0);

        let third = ring.allocate_bytes(32).unwrap();
        assert_eq!(third, first);
        assert_eq!(ring.wrap_count(), 1);
        assert_eq!(ring.used(), 32);
        assert_eq!(ring.high_water_mark(), 48);
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut ring = CircularAllocator::<GlobalAllocator>::new(64).unwrap();
        ring.allocate_bytes(16).unwrap();
        assert!(ring.allocate_bytes(65).is_none());
        assert_eq!(ring.used(), 16);
        assert_eq!(ring.wrap_count(), 0);
    }

    #[test]
    fn test_deallocate_is_noop_and_reset_rewinds() {
        let mut ring = CircularAllocator::<GlobalAllocator>::new(128).unwrap();
        let a = ring.allocate_bytes(16).unwrap();
        unsafe { ring.deallocate_bytes(a, 16) };
        assert_eq!(ring.used(), 16);

        ring.reset();
        assert_eq!(ring.allocate_bytes(16).unwrap(), a);
    }

    #[test]
    fn test_provenance_and_alignment() {
        let mut ring = CircularAllocator::<GlobalAllocator>::new(128).unwrap();
        let _ = ring.allocate_typed::<u8>().unwrap();
        let wide = ring.allocate_typed::<u64>().unwrap();
        assert_eq!(wide.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
        assert!(ring.has_allocated_ptr(wide.as_ptr().cast::<u8>()));

        let outside = 0u64;
        assert!(!ring.has_allocated_ptr((&outside as *const u64).cast::<u8>()));
    }

    #[test]
    fn test_over_heap() {
        let heap = Heap::reserve(256).unwrap();
        let base = heap.base();
        let mut ring = CircularAllocator::with_parent(256, heap).unwrap();
        assert_eq!(ring.allocate_bytes(200).unwrap(), base);
        assert_eq!(ring.allocate_bytes(100).unwrap(), base);
        assert_eq!(ring.max_size(), 256);
    }
}
