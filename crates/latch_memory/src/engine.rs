//! Process-wide engine memory state.
//!
//! One [`EngineGlobals`] instance exists between [`init`] and [`shutdown`].
//! It owns the single-frame heap (rewound every frame) and the scratch heap
//! (rewound on request), and is reached by the frame-scoped allocators in
//! [`crate::frame`].

use crate::allocator::Allocator;
use crate::circular::CircularAllocator;
use crate::error::AllocError;
use crate::heap::Heap;
use crate::kib;
use crate::stack::{OverflowPolicy, StackAllocator};
use parking_lot::{const_mutex, Mutex};
use std::alloc::Layout;
use std::ptr::NonNull;

/// Byte sizes of the engine-owned heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHeapConfig {
    pub single_frame_heap_size: usize,
    pub scratch_heap_size: usize,
}

impl Default for EngineHeapConfig {
    fn default() -> Self {
        Self {
            single_frame_heap_size: kib(4),
            scratch_heap_size: kib(4),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    index: u64,
}

impl FrameInfo {
    /// Frames completed since [`init`].
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }
}

/// The heaps behind the frame-scoped allocators.
#[derive(Debug)]
pub struct EngineGlobals {
    single_frame: StackAllocator<Heap>,
    scratch: CircularAllocator<Heap>,
    frame_info: FrameInfo,
}

impl EngineGlobals {
    pub fn new(config: &EngineHeapConfig) -> Result<Self, AllocError> {
        let single_frame = StackAllocator::with_parent(
            config.single_frame_heap_size,
            Heap::reserve(config.single_frame_heap_size)?,
        )?
        .with_overflow_policy(OverflowPolicy::Recoverable);
        let scratch = CircularAllocator::with_parent(
            config.scratch_heap_size,
            Heap::reserve(config.scratch_heap_size)?,
        )?;

        Ok(Self {
            single_frame,
            scratch,
            frame_info: FrameInfo::default(),
        })
    }

    pub fn temp_alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.single_frame.allocate(layout)
    }

    /// # Safety
    /// `ptr` must come from [`EngineGlobals::temp_alloc`] in the current frame.
    pub unsafe fn temp_free(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.single_frame.deallocate(ptr, layout)
    }

    pub fn is_temp_alloc(&self, ptr: *const u8) -> bool {
        self.single_frame.has_allocated_ptr(ptr)
    }

    pub fn scratch_alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.scratch.allocate(layout)
    }

    /// # Safety
    /// `ptr` must come from [`EngineGlobals::scratch_alloc`].
    pub unsafe fn scratch_free(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.scratch.deallocate(ptr, layout)
    }

    pub fn is_scratch_alloc(&self, ptr: *const u8) -> bool {
        self.scratch.has_allocated_ptr(ptr)
    }

    pub fn single_frame_capacity(&self) -> usize {
        self.single_frame.capacity()
    }

    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    pub fn single_frame_used(&self) -> usize {
        self.single_frame.used()
    }

    pub fn scratch_used(&self) -> usize {
        self.scratch.used()
    }

    /// Peak single-frame usage over all frames so far.
    pub fn single_frame_high_water_mark(&self) -> usize {
        self.single_frame.high_water_mark()
    }

    pub fn scratch_high_water_mark(&self) -> usize {
        self.scratch.high_water_mark()
    }

    /// Rewind the single-frame heap and move to the next frame.
    pub fn advance_frame(&mut self) {
        self.single_frame.reset();
        self.frame_info.index += 1;
    }

    pub fn reset_scratch(&mut self) {
        self.scratch.reset();
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.frame_info
    }
}

static INSTANCE: Mutex<Option<EngineGlobals>> = const_mutex(None);

/// Serializes unit tests that touch the process-wide instance.
#[cfg(test)]
pub(crate) static ENGINE_TEST_LOCK: Mutex<()> = const_mutex(());

/// Create the engine heaps. Fails if an instance already exists.
pub fn init(config: EngineHeapConfig) -> Result<(), AllocError> {
    let mut instance = INSTANCE.lock();
    if instance.is_some() {
        return Err(AllocError::AlreadyInitialized);
    }
    *instance = Some(EngineGlobals::new(&config)?);
    tracing::info!(
        single_frame_heap_size = config.single_frame_heap_size,
        scratch_heap_size = config.scratch_heap_size,
        "engine heaps created"
    );
    Ok(())
}

/// Destroy the engine heaps. Every pointer from the frame-scoped allocators
/// is invalid afterwards.
pub fn shutdown() {
    match INSTANCE.lock().take() {
        Some(globals) => tracing::info!(frames = globals.frame_info.index, "engine heaps destroyed"),
        None => tracing::debug!("engine shutdown without an instance"),
    }
}

pub fn is_initialized() -> bool {
    INSTANCE.lock().is_some()
}

/// End the current frame. No-op without an instance.
pub fn advance_frame() {
    if with_instance(EngineGlobals::advance_frame).is_none() {
        tracing::warn!("advance_frame called without an engine instance");
    }
}

pub fn reset_scratch() {
    if with_instance(EngineGlobals::reset_scratch).is_none() {
        tracing::warn!("reset_scratch called without an engine instance");
    }
}

/// Current frame, or `None` without an instance.
pub fn frame_info() -> Option<FrameInfo> {
    with_instance(|globals| globals.frame_info())
}

/// Run `f` against the live instance. Must not be re-entered from `f`.
pub(crate) fn with_instance<R>(f: impl FnOnce(&mut EngineGlobals) -> R) -> Option<R> {
    INSTANCE.lock().as_mut().map(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_4kib() {
        let config = EngineHeapConfig::default();
        assert_eq!(config.single_frame_heap_size, 4096);
        assert_eq!(config.scratch_heap_size, 4096);
    }

    #[test]
    fn test_globals_reset_cadence() {
        let mut globals = EngineGlobals::new(&EngineHeapConfig::default()).unwrap();
        let layout = Layout::from_size_align(64, 16).unwrap();

        let temp = globals.temp_alloc(layout).unwrap();
        let scratch = globals.scratch_alloc(layout).unwrap();
        assert!(globals.is_temp_alloc(temp.as_ptr()));
        assert!(globals.is_scratch_alloc(scratch.as_ptr()));
        assert!(!globals.is_temp_alloc(scratch.as_ptr()));

        globals.advance_frame();
        assert_eq!(globals.frame_info().index(), 1);
        assert_eq!(globals.single_frame_used(), 0);
        assert_eq!(globals.scratch_used(), 64);
        assert!(!globals.is_temp_alloc(temp.as_ptr()));
        assert_eq!(globals.single_frame_high_water_mark(), 64);
        assert_eq!(globals.scratch_high_water_mark(), 64);

        globals.reset_scratch();
        assert_eq!(globals.scratch_used(), 0);
    }

    #[test]
    fn test_single_frame_exhaustion_is_recoverable() {
        let config = EngineHeapConfig {
            single_frame_heap_size: 64,
            scratch_heap_size: 64,
        };
        let mut globals = EngineGlobals::new(&config).unwrap();
        let layout = Layout::from_size_align(48, 16).unwrap();
        assert!(globals.temp_alloc(layout).is_some());
        assert!(globals.temp_alloc(layout).is_none());
    }

    #[test]
    fn test_zero_sized_heap_rejected() {
        let config = EngineHeapConfig {
            single_frame_heap_size: 0,
            scratch_heap_size: 64,
        };
        assert_eq!(
            EngineGlobals::new(&config).unwrap_err(),
            AllocError::InvalidCapacity { capacity: 0 }
        );
    }

    #[test]
    fn test_init_shutdown_lifecycle() {
        let _guard = ENGINE_TEST_LOCK.lock();
        shutdown();
        assert!(!is_initialized());
        assert_eq!(frame_info(), None);

        init(EngineHeapConfig::default()).unwrap();
        assert!(is_initialized());
        assert_eq!(init(EngineHeapConfig::default()), Err(AllocError::AlreadyInitialized));

        advance_frame();
        advance_frame();
        assert_eq!(frame_info().map(|info| info.index()), Some(2));

        shutdown();
        assert!(!is_initialized());
        advance_frame();
        reset_scratch();
    }
}
