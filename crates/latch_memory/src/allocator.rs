//! The allocator seam shared by every allocator in the crate.

use std::alloc::Layout;
use std::ptr::NonNull;

/// Alignment used for untyped byte requests.
pub const MAX_ALIGN: usize = 16;

/// Raw-memory allocator interface.
///
/// Allocation never constructs anything and never panics on exhaustion:
/// `None` means the request could not be satisfied.
pub trait Allocator {
    /// Reserve memory that fits `layout`.
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory previously handed out by `allocate`.
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not have been deallocated since.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);

    /// Largest single allocation this allocator can satisfy right now.
    fn max_size(&self) -> usize;

    /// Whether `ptr` lies in memory this allocator is responsible for.
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool;

    /// Untyped request aligned to [`MAX_ALIGN`].
    fn allocate_bytes(&mut self, size: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size, MAX_ALIGN).ok()?;
        self.allocate(layout)
    }

    /// # Safety
    /// Same contract as [`Allocator::deallocate`], for a block obtained from
    /// [`Allocator::allocate_bytes`] with the same `size`.
    unsafe fn deallocate_bytes(&mut self, ptr: NonNull<u8>, size: usize) {
        if let Ok(layout) = Layout::from_size_align(size, MAX_ALIGN) {
            self.deallocate(ptr, layout);
        }
    }

    /// Room for one `T`. Nothing is constructed.
    fn allocate_typed<T>(&mut self) -> Option<NonNull<T>>
    where
        Self: Sized,
    {
        self.allocate(Layout::new::<T>()).map(NonNull::cast)
    }

    /// # Safety
    /// `ptr` must come from [`Allocator::allocate_typed`] on this allocator.
    /// Any value stored there must already have been dropped.
    unsafe fn deallocate_typed<T>(&mut self, ptr: NonNull<T>)
    where
        Self: Sized,
    {
        self.deallocate(ptr.cast(), Layout::new::<T>());
    }
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
    #[inline]
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }

    #[inline]
    fn max_size(&self) -> usize {
        (**self).max_size()
    }

    #[inline]
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        (**self).has_allocated_ptr(ptr)
    }
}

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}
