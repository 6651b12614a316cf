use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifecycle counters fed by [`super::GlobalDebugAllocator`].
///
/// Every construction counts as created and as a constructor call; copy and
/// move constructions additionally bump their own counter. So
/// `num_created == num_ctor_calls` always holds.
#[derive(Debug, Default)]
pub struct AllocCounters {
    created: AtomicUsize,
    ctor_calls: AtomicUsize,
    copy_ctor_calls: AtomicUsize,
    move_ctor_calls: AtomicUsize,
    dtor_calls: AtomicUsize,
    copy_assignment_calls: AtomicUsize,
    move_assignment_calls: AtomicUsize,
}

/// Plain copy of an [`AllocCounters`] set at one point in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub num_created: usize,
    pub num_ctor_calls: usize,
    pub num_copy_ctor_calls: usize,
    pub num_move_ctor_calls: usize,
    pub num_dtor_calls: usize,
    pub num_copy_assignment_calls: usize,
    pub num_move_assignment_calls: usize,
}

impl CounterSnapshot {
    /// Objects constructed and not yet destroyed.
    pub fn outstanding(&self) -> usize {
        debug_assert!(self.num_dtor_calls <= self.num_created);
        self.num_created.saturating_sub(self.num_dtor_calls)
    }
}

static GLOBAL_COUNTERS: AllocCounters = AllocCounters::new();

#[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Construction {
    Value,
    Copy,
    Move,
}

impl AllocCounters {
    pub const fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            ctor_calls: AtomicUsize::new(0),
            copy_ctor_calls: AtomicUsize::new(0),
            move_ctor_calls: AtomicUsize::new(0),
            dtor_calls: AtomicUsize::new(0),
            copy_assignment_calls: AtomicUsize::new(0),
            move_assignment_calls: AtomicUsize::new(0),
        }
    }

    /// The process-wide set.
    pub fn global() -> &'static AllocCounters {
        &GLOBAL_COUNTERS
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            num_created: self.created.load(Ordering::Relaxed),
            num_ctor_calls: self.ctor_calls.load(Ordering::Relaxed),
            num_copy_ctor_calls: self.copy_ctor_calls.load(Ordering::Relaxed),
            num_move_ctor_calls: self.move_ctor_calls.load(Ordering::Relaxed),
            num_dtor_calls: self.dtor_calls.load(Ordering::Relaxed),
            num_copy_assignment_calls: self.copy_assignment_calls.load(Ordering::Relaxed),
            num_move_assignment_calls: self.move_assignment_calls.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter. Test harnesses call this between cases.
    pub fn reset(&self) {
        for counter in [
            &self.created,
            &self.ctor_calls,
            &self.copy_ctor_calls,
            &self.move_ctor_calls,
            &self.dtor_calls,
            &self.copy_assignment_calls,
            &self.move_assignment_calls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    #[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
    pub(crate) fn record_construction(&self, kind: Construction) {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.ctor_calls.fetch_add(1, Ordering::Relaxed);
        match kind {
            Construction::Value => {}
            Construction::Copy => {
                self.copy_ctor_calls.fetch_add(1, Ordering::Relaxed);
            }
            Construction::Move => {
                self.move_ctor_calls.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
    pub(crate) fn record_destruction(&self) {
        self.dtor_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
    pub(crate) fn record_copy_assignment(&self) {
        self.copy_assignment_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg_attr(feature = "disable_debug_allocation", allow(dead_code))]
    pub(crate) fn record_move_assignment(&self) {
        self.move_assignment_calls.fetch_add(1, Ordering::Relaxed);
    }
}
