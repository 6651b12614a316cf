//! Stateless facade over the process allocator.

use crate::allocator::Allocator;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// The default production allocator.
///
/// Routes to the process allocator. With `mem_tracking` enabled every
/// allocation is recorded, which backs [`Allocator::has_allocated_ptr`] and
/// [`crate::query_mem_tracking_stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GlobalAllocator;

impl GlobalAllocator {
    pub const fn new() -> Self {
        Self
    }
}

/// Zero-size requests are served as one byte so every pointer is unique.
#[inline]
fn backend_layout(layout: Layout) -> Layout {
    if layout.size() == 0 {
        // SAFETY: align comes from a valid layout and 1 <= align.
        unsafe { Layout::from_size_align_unchecked(1, layout.align()) }
    } else {
        layout
    }
}

impl Allocator for GlobalAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let layout = backend_layout(layout);
        // SAFETY: backend_layout never has a zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;

        #[cfg(feature = "mem_tracking")]
        crate::tracking::global_tracker()
            .lock()
            .track_alloc(ptr.as_ptr() as usize, layout.size());

        Some(ptr)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        #[cfg(feature = "mem_tracking")]
        {
            let tracked = crate::tracking::global_tracker()
                .lock()
                .track_dealloc(ptr.as_ptr() as usize);
            debug_assert!(tracked.is_some(), "pointer {ptr:p} was not allocated by GlobalAllocator");
        }

        alloc::dealloc(ptr.as_ptr(), backend_layout(layout));
    }

    fn max_size(&self) -> usize {
        isize::MAX as usize
    }

    #[cfg(feature = "mem_tracking")]
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        crate::tracking::global_tracker().lock().owns(ptr as usize)
    }

    /// Without tracking there is no provenance table; any non-null address
    /// may have come from the process allocator.
    #[cfg(not(feature = "mem_tracking"))]
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        !ptr.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_allocation() {
        let mut alloc = GlobalAllocator;

        let ptr = alloc.allocate_bytes(10).unwrap();
        assert!(alloc.has_allocated_ptr(ptr.as_ptr()));
        unsafe { alloc.deallocate_bytes(ptr, 10) };
    }

    #[test]
    fn test_typed_allocation_is_raw() {
        let mut alloc = GlobalAllocator;
        let ptr = alloc.allocate_typed::<[u64; 4]>().unwrap();
        assert_eq!(ptr.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
        unsafe {
            ptr.as_ptr().write([1, 2, 3, 4]);
            assert_eq!((*ptr.as_ptr())[3], 4);
            alloc.deallocate_typed(ptr);
        }
    }

    #[test]
    fn test_zero_size_is_unique() {
        let mut alloc = GlobalAllocator;
        let a = alloc.allocate_bytes(0).unwrap();
        let b = alloc.allocate_bytes(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            alloc.deallocate_bytes(a, 0);
            alloc.deallocate_bytes(b, 0);
        }
    }

    #[test]
    fn test_max_size() {
        assert_eq!(GlobalAllocator.max_size(), isize::MAX as usize);
        assert!(GlobalAllocator.allocate_bytes(usize::MAX).is_none());
    }

    #[cfg(feature = "mem_tracking")]
    #[test]
    fn test_provenance_ends_at_deallocate() {
        let mut alloc = GlobalAllocator;
        let ptr = alloc.allocate_bytes(64).unwrap();
        let interior = ptr.as_ptr().wrapping_add(63);
        assert!(alloc.has_allocated_ptr(interior));

        unsafe { alloc.deallocate_bytes(ptr, 64) };
        let local = 0u8;
        assert!(!alloc.has_allocated_ptr(&local));
    }
}
