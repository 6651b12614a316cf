//! Fixed-size block allocator.
//!
//! The budget is cut into equally sized blocks linked through their first
//! word while free. Allocation pops the head, deallocation pushes it back.

use crate::allocator::{align_up, Allocator, MAX_ALIGN};
use crate::error::AllocError;
use crate::global::GlobalAllocator;
use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;

type FreeLink = Option<NonNull<u8>>;

pub struct BlockAllocator<P: Allocator = GlobalAllocator> {
    parent: P,
    base: NonNull<u8>,
    budget: Layout,
    block_size: usize,
    stride: usize,
    block_count: usize,
    head: FreeLink,
    free: usize,
}

// SAFETY: the budget is exclusively owned by this allocator until drop.
unsafe impl<P: Allocator + Send> Send for BlockAllocator<P> {}

impl<P: Allocator + Default> BlockAllocator<P> {
    pub fn new(capacity: usize, block_size: usize) -> Result<Self, AllocError> {
        Self::with_parent(capacity, block_size, P::default())
    }
}

impl<P: Allocator> BlockAllocator<P> {
    pub fn with_parent(capacity: usize, block_size: usize, mut parent: P) -> Result<Self, AllocError> {
        if block_size == 0 {
            return Err(AllocError::InvalidBlockSize { block_size });
        }
        let stride = align_up(block_size.max(mem::size_of::<FreeLink>()), MAX_ALIGN)
            .ok_or(AllocError::InvalidBlockSize { block_size })?;
        let block_count = capacity / stride;
        if block_count == 0 {
            return Err(AllocError::InvalidCapacity { capacity });
        }
        let rem = capacity % stride;
        if rem > 0 {
            tracing::warn!(
                capacity,
                stride,
                "block size is not a good denominator for block allocator, increase by {} bytes to be perfectly matched",
                stride - rem
            );
        }

        let budget = Layout::from_size_align(block_count * stride, MAX_ALIGN)
            .map_err(|_| AllocError::InvalidCapacity { capacity })?;
        let base = parent
            .allocate(budget)
            .ok_or(AllocError::ReservationFailed { size: budget.size() })?;

        let mut allocator = Self {
            parent,
            base,
            budget,
            block_size,
            stride,
            block_count,
            head: None,
            free: 0,
        };
        allocator.link_all_blocks();
        tracing::debug!(block_size, block_count, "block allocator created");
        Ok(allocator)
    }

    fn link_all_blocks(&mut self) {
        for index in (0..self.block_count).rev() {
            let block = self.block_at(index);
            // SAFETY: block lies inside the budget and is aligned to MAX_ALIGN.
            unsafe { block.cast::<FreeLink>().as_ptr().write(self.head) };
            self.head = Some(block);
        }
        self.free = self.block_count;
    }

    fn block_at(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.block_count);
        // SAFETY: index * stride is inside the budget.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * self.stride)) }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free
    }

    fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset < self.budget.size()).then_some(offset)
    }
}

impl<P: Allocator> Allocator for BlockAllocator<P> {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() > self.block_size || layout.align() > MAX_ALIGN {
            tracing::warn!(
                size = layout.size(),
                block_size = self.block_size,
                "request does not fit a block allocator block"
            );
            return None;
        }
        let block = self.head?;
        // SAFETY: free blocks always hold the next link in their first word.
        self.head = unsafe { block.cast::<FreeLink>().as_ptr().read() };
        self.free -= 1;
        Some(block)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        debug_assert!(
            self.offset_of(ptr.as_ptr()).is_some_and(|offset| offset % self.stride == 0),
            "pointer {ptr:p} is not a block of this block allocator"
        );
        ptr.cast::<FreeLink>().as_ptr().write(self.head);
        self.head = Some(ptr);
        self.free += 1;
    }

    fn max_size(&self) -> usize {
        if self.head.is_some() {
            self.block_size
        } else {
            0
        }
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.offset_of(ptr).is_some()
    }
}

impl<P: Allocator> Drop for BlockAllocator<P> {
    fn drop(&mut self) {
        // SAFETY: base was reserved from parent with this exact layout.
        unsafe { self.parent.deallocate(self.base, self.budget) };
    }
}

impl<P: Allocator> std::fmt::Debug for BlockAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("free", &self.free)
            .finish()
    }
}
