//! Fixed-capacity byte region, reserved once and never resized.

use crate::allocator::Allocator;
use crate::error::AllocError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every heap base address (one cache line).
pub const HEAP_ALIGNMENT: usize = 64;

/// A contiguous region owned exclusively by one allocator.
///
/// The region is requested from the platform once in [`Heap::reserve`] and
/// released once on drop.
///
/// A heap can also stand in as the parent of another allocator: it lends its
/// whole region to one borrower at a time. Lending is not usage, so the
/// high-water mark only moves for owners that report it, like
/// [`crate::BuddyAllocator`]. Stack and circular borrowers keep their own.
pub struct Heap {
    base: NonNull<u8>,
    capacity: usize,
    high_water_mark: usize,
    lent: bool,
}

// SAFETY: the heap uniquely owns its region, like a `Box<[u8]>`.
unsafe impl Send for Heap {}

impl Heap {
    /// Reserve `capacity` bytes from the platform.
    pub fn reserve(capacity: usize) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::InvalidCapacity { capacity });
        }
        let layout = Layout::from_size_align(capacity, HEAP_ALIGNMENT)
            .map_err(|_| AllocError::InvalidCapacity { capacity })?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(ptr).ok_or(AllocError::ReservationFailed { size: capacity })?;

        tracing::debug!(capacity, "reserved heap");
        Ok(Self {
            base,
            capacity,
            high_water_mark: 0,
            lent: false,
        })
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Peak number of bytes the owning buddy allocator has had in use.
    #[inline]
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// Offset of `ptr` from the base, if it lies inside the region.
    #[inline]
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset < self.capacity).then_some(offset)
    }

    /// Pointer `offset` bytes into the region.
    #[inline]
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.capacity);
        // SAFETY: offset is inside the reserved region, so the result is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    pub(crate) fn record_usage(&mut self, used: usize) {
        debug_assert!(used <= self.capacity);
        self.high_water_mark = self.high_water_mark.max(used);
    }

    fn layout(&self) -> Layout {
        // SAFETY: validated in `reserve`.
        unsafe { Layout::from_size_align_unchecked(self.capacity, HEAP_ALIGNMENT) }
    }
}

impl Allocator for Heap {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if self.lent || layout.size() > self.capacity || layout.align() > HEAP_ALIGNMENT {
            return None;
        }
        self.lent = true;
        Some(self.base)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        debug_assert!(self.lent, "heap region returned while not lent");
        debug_assert_eq!(ptr, self.base, "heap region returned at the wrong address");
        self.lent = false;
    }

    fn max_size(&self) -> usize {
        if self.lent {
            0
        } else {
            self.capacity
        }
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.lent && self.contains(ptr)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // SAFETY: base was allocated in `reserve` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout()) };
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("high_water_mark", &self.high_water_mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_contains() {
        let heap = Heap::reserve(256).unwrap();
        assert_eq!(heap.capacity(), 256);
        assert_eq!(heap.base().as_ptr() as usize % HEAP_ALIGNMENT, 0);

        let base = heap.base().as_ptr();
        assert!(heap.contains(base));
        assert!(heap.contains(base.wrapping_add(255)));
        assert!(!heap.contains(base.wrapping_add(256)));
        assert!(!heap.contains(base.wrapping_sub(1)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            Heap::reserve(0).unwrap_err(),
            AllocError::InvalidCapacity { capacity: 0 }
        );
    }

    #[test]
    fn test_lends_region_once() {
        let mut heap = Heap::reserve(128).unwrap();
        let layout = Layout::from_size_align(100, 16).unwrap();

        let region = heap.allocate(layout).unwrap();
        assert_eq!(region, heap.base());
        assert_eq!(heap.high_water_mark(), 0);
        assert!(heap.allocate(layout).is_none());
        assert_eq!(heap.max_size(), 0);

        unsafe { heap.deallocate(region, layout) };
        assert_eq!(heap.max_size(), 128);
        assert!(heap.allocate(layout).is_some());
    }

    #[test]
    fn test_borrower_reports_its_own_peak() {
        use crate::stack::StackAllocator;

        let mut stack = StackAllocator::with_parent(256, Heap::reserve(256).unwrap()).unwrap();
        stack.allocate_bytes(40).unwrap();
        assert_eq!(stack.parent().high_water_mark(), 0);
        assert_eq!(stack.high_water_mark(), 40);
    }

    #[test]
    fn test_rejects_oversized_loan() {
        let mut heap = Heap::reserve(64).unwrap();
        assert!(heap.allocate_bytes(65).is_none());
        assert!(heap
            .allocate(Layout::from_size_align(8, HEAP_ALIGNMENT * 2).unwrap())
            .is_none());
    }
}
