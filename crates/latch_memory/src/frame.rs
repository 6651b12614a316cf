//! Allocators that forward to the heaps of the engine instance.
//!
//! Both types are stateless handles. Memory from
//! [`GlobalSingleFrameAllocator`] is valid until the next
//! [`crate::engine::advance_frame`]; memory from [`GlobalScratchAllocator`]
//! until [`crate::engine::reset_scratch`] or until the ring wraps over it.
//!
//! Without an engine instance every request fails and is logged.

use crate::allocator::Allocator;
use crate::engine::{self, EngineGlobals};
use std::alloc::Layout;
use std::ptr::{self, NonNull};

#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalSingleFrameAllocator;

#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalScratchAllocator;

fn forward<R>(what: &str, f: impl FnOnce(&mut EngineGlobals) -> R) -> Option<R> {
    let result = engine::with_instance(f);
    if result.is_none() {
        tracing::warn!("{what} used without an engine instance");
    }
    result
}

impl Allocator for GlobalSingleFrameAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        forward("single-frame allocator", |globals| globals.temp_alloc(layout)).flatten()
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        forward("single-frame allocator", |globals| globals.temp_free(ptr, layout));
    }

    fn max_size(&self) -> usize {
        forward("single-frame allocator", |globals| globals.single_frame_capacity()).unwrap_or(0)
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        forward("single-frame allocator", |globals| globals.is_temp_alloc(ptr)).unwrap_or(false)
    }
}

impl GlobalScratchAllocator {
    /// Move a scratch allocation into a block of `new_size` bytes.
    ///
    /// The first `min(old, new)` bytes are carried over. The new block may
    /// overlap the old one after a wrap.
    ///
    /// # Safety
    /// `ptr` must come from this allocator with `old_layout` and still be
    /// live.
    pub unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let new_layout = Layout::from_size_align(new_size, old_layout.align()).ok()?;
        let new_ptr = self.allocate(new_layout)?;
        if new_ptr != ptr {
            ptr::copy(ptr.as_ptr(), new_ptr.as_ptr(), old_layout.size().min(new_size));
        }
        Some(new_ptr)
    }
}

impl Allocator for GlobalScratchAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        forward("scratch allocator", |globals| globals.scratch_alloc(layout)).flatten()
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        forward("scratch allocator", |globals| globals.scratch_free(ptr, layout));
    }

    fn max_size(&self) -> usize {
        forward("scratch allocator", |globals| globals.scratch_capacity()).unwrap_or(0)
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        forward("scratch allocator", |globals| globals.is_scratch_alloc(ptr)).unwrap_or(false)
    }
}
