use thiserror::Error;

/// Errors raised while building allocators or rewinding them.
///
/// Exhaustion is not an error: allocation calls return `None` and the caller
/// decides whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("failed to reserve {size} bytes from the backing allocator")]
    ReservationFailed { size: usize },

    #[error("invalid capacity of {capacity} bytes")]
    InvalidCapacity { capacity: usize },

    #[error("invalid block size of {block_size} bytes")]
    InvalidBlockSize { block_size: usize },

    #[error("stack allocator overflow: requested {requested} bytes with {remaining} remaining")]
    StackOverflow { requested: usize, remaining: usize },

    #[error("stack mark at offset {offset} is stale (generation {generation}, current {current})")]
    StaleMark {
        offset: usize,
        generation: u32,
        current: u32,
    },

    #[error("engine globals are already initialized")]
    AlreadyInitialized,
}
