//! Binary buddy allocator over an owned heap.
//!
//! The heap is `min_block_size * 2^max_order` bytes. A block of order `o`
//! spans `min_block_size << o` bytes and starts at a multiple of its own size,
//! so its buddy is found by flipping bit `o` of its block index.
//!
//! Block metadata lives out of band, one entry per minimum block. Only the
//! entry at the start of a block is meaningful. An entry is flagged free iff
//! its block sits on the free list of the recorded order, which is what makes
//! the merge check in `deallocate` O(1).

use crate::allocator::Allocator;
use crate::error::AllocError;
use crate::heap::{Heap, HEAP_ALIGNMENT};
use std::alloc::Layout;
use std::ptr::NonNull;

/// Default minimum block size in bytes.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 16;

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct BlockMeta {
    order: u8,
    free: bool,
    prev: u32,
    next: u32,
}

impl Default for BlockMeta {
    fn default() -> Self {
        Self {
            order: 0,
            free: false,
            prev: NIL,
            next: NIL,
        }
    }
}

pub struct BuddyAllocator {
    heap: Heap,
    min_block_shift: u32,
    max_order: u8,
    /// Head block index per order.
    free_heads: Vec<u32>,
    free_counts: Vec<usize>,
    blocks: Vec<BlockMeta>,
    used: usize,
}

impl BuddyAllocator {
    /// Buddy allocator with [`DEFAULT_MIN_BLOCK_SIZE`] blocks.
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Self::with_min_block_size(capacity, DEFAULT_MIN_BLOCK_SIZE)
    }

    /// `capacity` is rounded down to `min_block_size * 2^k`.
    pub fn with_min_block_size(capacity: usize, min_block_size: usize) -> Result<Self, AllocError> {
        if !min_block_size.is_power_of_two() {
            return Err(AllocError::InvalidBlockSize {
                block_size: min_block_size,
            });
        }
        if capacity < min_block_size {
            return Err(AllocError::InvalidCapacity { capacity });
        }

        let block_count = capacity / min_block_size;
        let max_order = block_count.ilog2();
        if max_order >= u32::BITS {
            return Err(AllocError::InvalidCapacity { capacity });
        }

        let usable = min_block_size << max_order;
        if usable != capacity {
            tracing::warn!(
                capacity,
                usable,
                "buddy allocator capacity is not min_block_size * 2^k, {} bytes unused",
                capacity - usable
            );
        }

        let heap = Heap::reserve(usable)?;
        let mut allocator = Self {
            heap,
            min_block_shift: min_block_size.trailing_zeros(),
            max_order: max_order as u8,
            free_heads: vec![NIL; max_order as usize + 1],
            free_counts: vec![0; max_order as usize + 1],
            blocks: vec![BlockMeta::default(); 1usize << max_order],
            used: 0,
        };
        allocator.push_free(0, allocator.max_order);

        tracing::debug!(usable, min_block_size, max_order, "buddy allocator created");
        Ok(allocator)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    #[inline]
    pub fn min_block_size(&self) -> usize {
        1 << self.min_block_shift
    }

    #[inline]
    pub fn max_order(&self) -> u8 {
        self.max_order
    }

    /// Bytes handed out, counted in whole blocks.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of free blocks of `order`.
    pub fn free_blocks(&self, order: u8) -> usize {
        self.free_counts.get(order as usize).copied().unwrap_or(0)
    }

    /// True when the whole heap is a single free top-order block.
    pub fn is_fully_coalesced(&self) -> bool {
        let top = self.max_order as usize;
        self.free_counts[top] == 1 && self.free_counts[..top].iter().all(|&n| n == 0)
    }

    /// Size of the block a request of `size` bytes would occupy.
    pub fn block_size_for(&self, size: usize) -> Option<usize> {
        self.order_for(size).map(|order| self.block_size(order))
    }

    #[inline]
    fn block_size(&self, order: u8) -> usize {
        1usize << (self.min_block_shift + order as u32)
    }

    fn order_for(&self, size: usize) -> Option<u8> {
        let blocks = size.max(1).div_ceil(self.min_block_size());
        let order = blocks.checked_next_power_of_two()?.trailing_zeros();
        (order <= self.max_order as u32).then_some(order as u8)
    }

    fn push_free(&mut self, index: u32, order: u8) {
        let head = self.free_heads[order as usize];
        self.blocks[index as usize] = BlockMeta {
            order,
            free: true,
            prev: NIL,
            next: head,
        };
        if head != NIL {
            self.blocks[head as usize].prev = index;
        }
        self.free_heads[order as usize] = index;
        self.free_counts[order as usize] += 1;
    }

    fn unlink(&mut self, index: u32) {
        let BlockMeta {
            order, prev, next, ..
        } = self.blocks[index as usize];
        if prev == NIL {
            self.free_heads[order as usize] = next;
        } else {
            self.blocks[prev as usize].next = next;
        }
        if next != NIL {
            self.blocks[next as usize].prev = prev;
        }
        let meta = &mut self.blocks[index as usize];
        meta.free = false;
        meta.prev = NIL;
        meta.next = NIL;
        self.free_counts[order as usize] -= 1;
    }

    fn largest_free_order(&self) -> Option<u8> {
        (0..=self.max_order)
            .rev()
            .find(|&order| self.free_heads[order as usize] != NIL)
    }
}

impl Allocator for BuddyAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.align() > HEAP_ALIGNMENT {
            return None;
        }
        // Blocks start at multiples of their size, so a block at least as big
        // as the alignment is aligned.
        let order = self.order_for(layout.size().max(layout.align()))?;
        let mut current = (order..=self.max_order).find(|&o| self.free_heads[o as usize] != NIL)?;

        let index = self.free_heads[current as usize];
        self.unlink(index);
        while current > order {
            current -= 1;
            self.push_free(index + (1u32 << current), current);
        }
        self.blocks[index as usize].order = order;

        self.used += self.block_size(order);
        self.heap.record_usage(self.used);
        Some(self.heap.ptr_at((index as usize) << self.min_block_shift))
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        let Some(offset) = self.heap.offset_of(ptr.as_ptr()) else {
            debug_assert!(false, "pointer {ptr:p} was not allocated by this buddy allocator");
            return;
        };
        debug_assert_eq!(
            offset & (self.min_block_size() - 1),
            0,
            "pointer {ptr:p} is not the start of a buddy block"
        );

        let mut index = (offset >> self.min_block_shift) as u32;
        let mut order = self.blocks[index as usize].order;
        if self.blocks[index as usize].free {
            debug_assert!(false, "double free of buddy block at offset {offset}");
            return;
        }
        self.used -= self.block_size(order);

        while order < self.max_order {
            let buddy = index ^ (1u32 << order);
            let meta = self.blocks[buddy as usize];
            if !meta.free || meta.order != order {
                break;
            }
            self.unlink(buddy);
            index = index.min(buddy);
            order += 1;
        }
        self.push_free(index, order);
    }

    fn max_size(&self) -> usize {
        self.largest_free_order()
            .map_or(0, |order| self.block_size(order))
    }

    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        self.heap.contains(ptr)
    }
}

impl std::fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("capacity", &self.capacity())
            .field("min_block_size", &self.min_block_size())
            .field("max_order", &self.max_order)
            .field("used", &self.used)
            .field("free_counts", &self.free_counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(alloc: &BuddyAllocator, ptr: NonNull<u8>, size: usize) -> (usize, usize) {
        let start = ptr.as_ptr() as usize;
        (start, start + alloc.block_size_for(size).unwrap())
    }

    #[test]
    fn test_buddy_allocate_deallocate() {
        let mut alloc = BuddyAllocator::new(1024).unwrap();

        let p1 = alloc.allocate_typed::<i32>().unwrap();
        let p2 = alloc.allocate_typed::<i32>().unwrap();
        let p3 = alloc.allocate_typed::<i32>().unwrap();

        unsafe {
            p1.as_ptr().write(1);
            p2.as_ptr().write(2);
            p3.as_ptr().write(3);
            assert_eq!(*p1.as_ptr() + *p2.as_ptr() + *p3.as_ptr(), 6);

            alloc.deallocate_typed(p1);
            alloc.deallocate_typed(p2);
            alloc.deallocate_typed(p3);
        }
        assert!(alloc.is_fully_coalesced());
        assert_eq!(alloc.used(), 0);
    }

    #[test]
    fn test_fresh_allocator_is_one_block() {
        let alloc = BuddyAllocator::new(1024).unwrap();
        assert_eq!(alloc.max_order(), 6);
        assert!(alloc.is_fully_coalesced());
        assert_eq!(alloc.max_size(), 1024);
    }

    #[test]
    fn test_capacity_rounds_down() {
        let alloc = BuddyAllocator::new(1000).unwrap();
        assert_eq!(alloc.capacity(), 512);
    }

    #[test]
    fn test_invalid_configuration() {
        assert_eq!(
            BuddyAllocator::with_min_block_size(1024, 24).unwrap_err(),
            AllocError::InvalidBlockSize { block_size: 24 }
        );
        assert_eq!(
            BuddyAllocator::new(8).unwrap_err(),
            AllocError::InvalidCapacity { capacity: 8 }
        );
    }

    #[test]
    fn test_split_pushes_unused_halves() {
        let mut alloc = BuddyAllocator::new(256).unwrap();
        let p = alloc.allocate_bytes(16).unwrap();

        // 256 -> 128 + 64 + 32 + 16 + [16]
        for order in 0..4 {
            assert_eq!(alloc.free_blocks(order), 1, "order {order}");
        }
        assert_eq!(alloc.free_blocks(4), 0);
        assert_eq!(p, alloc.heap().base());

        unsafe { alloc.deallocate_bytes(p, 16) };
        assert!(alloc.is_fully_coalesced());
    }

    #[test]
    fn test_zero_size_uses_min_block() {
        let mut alloc = BuddyAllocator::new(256).unwrap();
        assert_eq!(alloc.block_size_for(0), Some(16));
        let p = alloc.allocate_bytes(0).unwrap();
        assert_eq!(alloc.used(), 16);
        unsafe { alloc.deallocate_bytes(p, 0) };
        assert_eq!(alloc.used(), 0);
    }

    #[test]
    fn test_rounds_up_to_power_of_two() {
        let alloc = BuddyAllocator::new(1024).unwrap();
        assert_eq!(alloc.block_size_for(17), Some(32));
        assert_eq!(alloc.block_size_for(100), Some(128));
        assert_eq!(alloc.block_size_for(1024), Some(1024));
        assert_eq!(alloc.block_size_for(1025), None);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut alloc = BuddyAllocator::new(1024).unwrap();
        assert!(alloc.allocate_bytes(2048).is_none());

        let whole = alloc.allocate_bytes(1024).unwrap();
        assert!(alloc.allocate_bytes(16).is_none());
        assert_eq!(alloc.max_size(), 0);

        unsafe { alloc.deallocate_bytes(whole, 1024) };
        assert!(alloc.allocate_bytes(16).is_some());
    }

    #[test]
    fn test_oversized_request_fails_under_any_fragmentation() {
        let mut alloc = BuddyAllocator::new(1024).unwrap();
        let mut live = Vec::new();
        for size in [16, 64, 32, 128, 16] {
            live.push((alloc.allocate_bytes(size).unwrap(), size));
            assert!(alloc.allocate_bytes(1025).is_none());
        }
        for (ptr, size) in live {
            unsafe { alloc.deallocate_bytes(ptr, size) };
            assert!(alloc.allocate_bytes(1025).is_none());
        }
    }

    #[test]
    fn test_live_allocations_never_overlap() {
        let mut alloc = BuddyAllocator::new(4096).unwrap();
        let sizes = [16, 200, 33, 64, 1, 512, 90, 16, 128, 700];
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut live = Vec::new();

        for size in sizes {
            let ptr = alloc.allocate_bytes(size).unwrap();
            let range = range_of(&alloc, ptr, size);
            for other in &ranges {
                assert!(range.1 <= other.0 || other.1 <= range.0, "{range:?} overlaps {other:?}");
            }
            assert!(alloc.has_allocated_ptr(ptr.as_ptr()));
            ranges.push(range);
            live.push((ptr, size));
        }

        for (ptr, size) in live {
            unsafe { alloc.deallocate_bytes(ptr, size) };
        }
        assert!(alloc.is_fully_coalesced());
    }

    #[test]
    fn test_round_trip_in_any_order_coalesces() {
        let mut alloc = BuddyAllocator::new(2048).unwrap();
        let sizes = [16, 48, 256, 16, 100, 512, 32, 16];

        for rotation in 0..sizes.len() {
            let mut live: Vec<_> = sizes
                .iter()
                .map(|&size| (alloc.allocate_bytes(size).unwrap(), size))
                .collect();
            live.rotate_left(rotation);
            if rotation % 2 == 1 {
                live.reverse();
            }
            for (ptr, size) in live {
                unsafe { alloc.deallocate_bytes(ptr, size) };
            }
            assert!(alloc.is_fully_coalesced(), "rotation {rotation}");
            assert_eq!(alloc.used(), 0);
        }
    }

    #[test]
    fn test_merge_requires_free_buddy() {
        let mut alloc = BuddyAllocator::new(64).unwrap();
        let a = alloc.allocate_bytes(16).unwrap();
        let b = alloc.allocate_bytes(16).unwrap();
        let c = alloc.allocate_bytes(32).unwrap();

        unsafe { alloc.deallocate_bytes(a, 16) };
        assert_eq!(alloc.free_blocks(0), 1);

        // b's buddy (a) is free, so they merge into a 32 block whose buddy c is live.
        unsafe { alloc.deallocate_bytes(b, 16) };
        assert_eq!(alloc.free_blocks(0), 0);
        assert_eq!(alloc.free_blocks(1), 1);
        assert!(!alloc.is_fully_coalesced());

        unsafe { alloc.deallocate_bytes(c, 32) };
        assert!(alloc.is_fully_coalesced());
    }

    #[test]
    fn test_high_water_mark_follows_peak() {
        let mut alloc = BuddyAllocator::new(1024).unwrap();
        let a = alloc.allocate_bytes(256).unwrap();
        let b = alloc.allocate_bytes(256).unwrap();
        unsafe {
            alloc.deallocate_bytes(a, 256);
            alloc.deallocate_bytes(b, 256);
        }
        assert_eq!(alloc.used(), 0);
        assert_eq!(alloc.heap().high_water_mark(), 512);
    }

    #[test]
    fn test_alignment_is_honored() {
        let mut alloc = BuddyAllocator::new(1024).unwrap();
        let _small = alloc.allocate_bytes(16).unwrap();
        let aligned = alloc
            .allocate(Layout::from_size_align(8, 64).unwrap())
            .unwrap();
        assert_eq!(aligned.as_ptr() as usize % 64, 0);
    }
}
