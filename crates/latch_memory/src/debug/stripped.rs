use super::GlobalDebugAllocator;
use crate::allocator::Allocator;
use std::alloc::Layout;
use std::ptr::NonNull;

// Debug allocation compiled out. Same signatures as the instrumented build,
// but nothing is written, dropped or counted.

impl GlobalDebugAllocator<'_> {
    /// No-op. `value` is dropped here.
    ///
    /// # Safety
    /// Always safe; `unsafe` only to match the instrumented signature.
    #[inline(always)]
    pub unsafe fn construct<T>(&self, _ptr: NonNull<T>, _value: T) {}

    /// # Safety
    /// Always safe.
    #[inline(always)]
    pub unsafe fn construct_copy<T: Clone>(&self, _ptr: NonNull<T>, _src: &T) {}

    /// # Safety
    /// Always safe. `src` is left untouched.
    #[inline(always)]
    pub unsafe fn construct_move<T: Default>(&self, _ptr: NonNull<T>, _src: &mut T) {}

    /// # Safety
    /// Always safe.
    #[inline(always)]
    pub unsafe fn assign_copy<T: Clone>(&self, _ptr: NonNull<T>, _src: &T) {}

    /// # Safety
    /// Always safe.
    #[inline(always)]
    pub unsafe fn assign_move<T: Default>(&self, _ptr: NonNull<T>, _src: &mut T) {}

    /// # Safety
    /// Always safe.
    #[inline(always)]
    pub unsafe fn destroy<T>(&self, _ptr: NonNull<T>) {}
}

impl Allocator for GlobalDebugAllocator<'_> {
    #[inline(always)]
    fn allocate(&mut self, _layout: Layout) -> Option<NonNull<u8>> {
        None
    }

    #[inline(always)]
    unsafe fn deallocate(&mut self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn max_size(&self) -> usize {
        0
    }

    fn has_allocated_ptr(&self, _ptr: *const u8) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::debug::{AllocCounters, CounterSnapshot, GlobalDebugAllocator};
    use crate::Allocator;
    use std::ptr::NonNull;

    #[derive(Debug, Default, Clone)]
    struct TestObject {
        value: u64,
    }

    #[test]
    fn test_kill_switch_keeps_counters_at_zero() {
        let counters = AllocCounters::new();
        let mut alloc = GlobalDebugAllocator::with_counters(&counters);
        let mut src = TestObject { value: 9 };

        for _ in 0..100 {
            assert!(alloc.allocate_bytes(10).is_none());
            assert!(alloc.allocate_typed::<TestObject>().is_none());

            let ptr = NonNull::<TestObject>::dangling();
            unsafe {
                alloc.construct(ptr, TestObject::default());
                alloc.construct_copy(ptr, &src);
                alloc.construct_move(ptr, &mut src);
                alloc.assign_copy(ptr, &src);
                alloc.assign_move(ptr, &mut src);
                alloc.destroy(ptr);
                alloc.deallocate_typed(ptr);
                alloc.deallocate_bytes(ptr.cast(), 10);
            }
        }

        assert_eq!(counters.snapshot(), CounterSnapshot::default());
        assert_eq!(src.value, 9);
        assert_eq!(alloc.max_size(), 0);
    }
}
