//! Bump allocator over a budget reserved from a parent allocator.

use crate::allocator::{align_up, Allocator, MAX_ALIGN};
use crate::error::AllocError;
use crate::global::GlobalAllocator;
use std::alloc::Layout;
use std::ptr::NonNull;

/// What a stack allocator does when a request does not fit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Log and panic. Overflow means the owner sized the stack wrong.
    #[default]
    Fatal,
    /// Log and return `None` from `allocate`.
    Recoverable,
}

/// A saved cursor position. Only valid for the generation it was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMark {
    offset: usize,
    generation: u32,
}

impl StackMark {
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A bump-pointer allocator.
///
/// Allocation advances a single cursor. Individual frees are ignored; memory
/// is released as a batch by rewinding with [`StackAllocator::reset`] or
/// [`StackAllocator::reset_to`]. After a full reset the same sequence of
/// requests yields the same sequence of addresses.
///
/// The budget is reserved from `P` on construction and returned on drop.
/// `P` can be held by value (stateless global allocators, a `Heap`) or as a
/// `&mut` borrow of a longer-lived allocator.
///
/// # Example
///
/// ```ignore
/// let mut stack = StackAllocator::<GlobalAllocator>::new(1024)?;
/// let a = stack.allocate_typed::<u32>();
/// stack.reset();
/// assert_eq!(stack.allocate_typed::<u32>(), a);
/// ```
pub struct StackAllocator<P: Allocator = GlobalAllocator> {
    parent: P,
    base: NonNull<u8>,
    budget: Layout,
    cursor: usize,
    peak: usize,
    generation: u32,
    policy: OverflowPolicy,
}

// SAFETY: the budget is exclusively owned by this allocator until drop.
unsafe impl<P: Allocator + Send> Send for StackAllocator<P> {}

impl<P: Allocator + Default> StackAllocator<P> {
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Self::with_parent(capacity, P::default())
    }
}

impl<P: Allocator> StackAllocator<P> {
    /// Reserve `capacity` bytes from `parent`.
    pub fn with_parent(capacity: usize, mut parent: P) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::InvalidCapacity { capacity });
        }
        let budget = Layout::from_size_align(capacity, MAX_ALIGN)
            .map_err(|_| AllocError::InvalidCapacity { capacity })?;
        let base = parent
            .allocate(budget)
            .ok_or(AllocError::ReservationFailed { size: capacity })?;

        tracing::debug!(capacity, "stack allocator reserved budget");
        Ok(Self {
            parent,
            base,
            budget,
            cursor: 0,
            peak: 0,
            generation: 0,
            policy: OverflowPolicy::default(),
        })
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.budget.size()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Highest cursor position reached, across rewinds.
    #[inline]
    pub fn high_water_mark(&self) -> usize {
        self.peak
    }

    /// Number of rewinds through [`StackAllocator::reset`].
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    /// Bump the cursor, reporting overflow instead of applying the policy.
    pub fn try_allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let overflow = AllocError::StackOverflow {
            requested: layout.size(),
            remaining: self.remaining(),
        };
        let base_addr = self.base.as_ptr() as usize;
        let start = align_up(base_addr + self.cursor, layout.align())
            .map(|addr| addr - base_addr)
            .ok_or_else(|| overflow.clone())?;
        // Zero-size requests still take a byte so no address is issued twice.
        let end = start
            .checked_add(layout.size().max(1))
            .ok_or_else(|| overflow.clone())?;
        if end > self.capacity() {
            return Err(overflow);
        }

        self.cursor = end;
        self.peak = self.peak.max(end);
        // SAFETY: start <= end <= capacity, inside the reserved budget.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }

    /// Save the current cursor.
    pub fn mark(&self) -> StackMark {
        StackMark {
            offset: self.cursor,
            generation: self.generation,
        }
    }

    /// Rewind to the start. Every address handed out becomes invalid.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Rewind to `mark`, releasing everything allocated since it was taken.
    ///
    /// Marks from before the last full reset, or past the current cursor,
    /// are rejected.
    pub fn reset_to(&mut self, mark: StackMark) -> Result<(), AllocError> {
        if mark.generation != self.generation || mark.offset > self.cursor {
            return Err(AllocError::StaleMark {
                offset: mark.offset,
                generation: mark.generation,
                current: self.generation,
            });
        }
        self.cursor = mark.offset;
        Ok(())
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let base_addr = self.base.as_ptr() as usize;
        (ptr as usize)
            .checked_sub(base_addr)
            .is_some_and(|offset| offset < self.capacity())
    }
}

impl<P: Allocator> Allocator for StackAllocator<P> {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        match self.try_allocate(layout) {
            Ok(ptr) => Some(ptr),
            Err(err) => match self.policy {
                OverflowPolicy::Fatal => {
                    tracing::error!(%err, capacity = self.capacity(), "stack allocator overflow");
                    panic!("{err}");
                }
                OverflowPolicy::Recoverable => {
                    tracing::warn!(%err, capacity = self.capacity(), "stack allocator exhausted");
                    None
                }
            },
        }
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        debug_assert!(
            self.contains(ptr.as_ptr()),
            "pointer {ptr:p} was not allocated by this stack allocator"
        );
    }

    fn max_size(&self) -> usize {
        self.remaining()
    }

    /// Range check over the bytes issued since the last rewind.
    fn has_allocated_ptr(&self, ptr: *const u8) -> bool {
        let base_addr = self.base.as_ptr() as usize;
        (ptr as usize)
            .checked_sub(base_addr)
            .is_some_and(|offset| offset < self.cursor)
    }
}

impl<P: Allocator> Drop for StackAllocator<P> {
    fn drop(&mut self) {
        // SAFETY: base was reserved from parent with this exact layout.
        unsafe { self.parent.deallocate(self.base, self.budget) };
    }
}

impl<P: Allocator> std::fmt::Debug for StackAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .field("peak", &self.peak)
            .field("generation", &self.generation)
            .field("policy", &self.policy)
            .finish()
    }
}
