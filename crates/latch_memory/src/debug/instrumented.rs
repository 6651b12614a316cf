use super::counters::Construction;
use super::GlobalDebugAllocator;
use crate::allocator::Allocator;
use std::alloc::Layout;
use std::ptr::{self, NonNull};

impl GlobalDebugAllocator<'_> {
    /// Place `value` at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for writes and aligned for `T`, and must not hold a
    /// live `T`.
    pub unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        ptr.as_ptr().write(value);
        self.counters.record_construction(Construction::Value);
    }

    /// Place a clone of `src` at `ptr`.
    ///
    /// # Safety
    /// Same as [`GlobalDebugAllocator::construct`].
    pub unsafe fn construct_copy<T: Clone>(&self, ptr: NonNull<T>, src: &T) {
        ptr.as_ptr().write(src.clone());
        self.counters.record_construction(Construction::Copy);
    }

    /// Move the contents of `src` to `ptr`, leaving `T::default()` behind.
    ///
    /// # Safety
    /// Same as [`GlobalDebugAllocator::construct`].
    pub unsafe fn construct_move<T: Default>(&self, ptr: NonNull<T>, src: &mut T) {
        ptr.as_ptr().write(std::mem::take(src));
        self.counters.record_construction(Construction::Move);
    }

    /// Overwrite the live `T` at `ptr` with a clone of `src`.
    ///
    /// # Safety
    /// `ptr` must point to a live, aligned `T`.
    pub unsafe fn assign_copy<T: Clone>(&self, ptr: NonNull<T>, src: &T) {
        (*ptr.as_ptr()).clone_from(src);
        self.counters.record_copy_assignment();
    }

    /// Overwrite the live `T` at `ptr` with the contents of `src`.
    ///
    /// # Safety
    /// `ptr` must point to a live, aligned `T`.
    pub unsafe fn assign_move<T: Default>(&self, ptr: NonNull<T>, src: &mut T) {
        *ptr.as_ptr() = std::mem::take(src);
        self.counters.record_move_assignment();
    }

    /// Drop the `T` at `ptr` in place. The memory stays allocated.
    ///
    /// # Safety
    /// `ptr` must point to a live `T` that is not used afterwards.
    pub unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        ptr::drop_in_place(ptr.as_ptr());
        self.counters.record_destruction();
    }
}

impl Allocator for GlobalDebugAllocator<'_> {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.inner.allocate(layout)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout)
    }

    fn max_size(&self) -> usize {
        self.inner.max_size()
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.inner.has_allocated_ptr(ptr)
    }
}
