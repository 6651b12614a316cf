//! Latch Engine Runtime
//!
//! Minimal binary that boots engine memory and runs a few frames

use anyhow::{Context, Result};
use latch_memory::{
    engine, kib, query_mem_tracking_stats, Allocator, BuddyAllocator, GlobalDebugAllocator,
    GlobalScratchAllocator, GlobalSingleFrameAllocator, StackAllocator,
};
use latch_services::settings::BootSettings;

const FRAMES: u32 = 3;

#[derive(Debug, Default, Clone)]
struct Transform {
    position: [f32; 3],
    scale: f32,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Latch Engine v{}", latch_memory::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => BootSettings::load(&path).with_context(|| format!("boot settings {path}"))?,
        None => BootSettings::hardcoded().clone(),
    };

    tracing::info!("Initializing services...");
    latch_services::init_services(&settings).context("engine heaps")?;

    let mut buddy = BuddyAllocator::new(kib(64))?;
    for _ in 0..FRAMES {
        run_frame(&mut buddy)?;
        engine::advance_frame();
    }

    let stats = query_mem_tracking_stats();
    tracing::info!(
        used = stats.used_memory,
        peak = stats.max_used_memory,
        live = stats.num_alive_allocations,
        total = stats.num_total_allocations,
        "global allocator stats"
    );
    tracing::info!(
        high_water_mark = buddy.heap().high_water_mark(),
        "buddy heap usage"
    );

    latch_services::shutdown_services();
    tracing::info!("Runtime shut down cleanly");
    Ok(())
}

fn run_frame(buddy: &mut BuddyAllocator) -> Result<()> {
    let frame = engine::frame_info().map(|info| info.index()).unwrap_or_default();

    let mut temp = GlobalSingleFrameAllocator;
    let per_frame = temp
        .allocate_bytes(256)
        .context("single-frame heap exhausted")?;

    let mut scratch = GlobalScratchAllocator;
    let scratch_block = scratch.allocate_bytes(128).context("scratch heap exhausted")?;

    // Transient work arena carved out of the buddy heap.
    let mut stack = StackAllocator::with_parent(kib(4), &mut *buddy)?;
    let mark = stack.mark();
    for _ in 0..16 {
        stack.allocate_typed::<Transform>().context("frame arena exhausted")?;
    }
    stack.reset_to(mark)?;

    let mut debug = GlobalDebugAllocator::new();
    let mut extent = 0.0;
    if let Some(ptr) = debug.allocate_typed::<Transform>() {
        // SAFETY: freshly allocated and sized for Transform.
        unsafe {
            debug.construct(
                ptr,
                Transform {
                    position: [frame as f32, 0.0, 0.0],
                    scale: 1.0,
                },
            );
            let transform = &*ptr.as_ptr();
            extent = transform.position[0] * transform.scale;
            debug.destroy(ptr);
            debug.deallocate_typed(ptr);
        }
    }

    let created = debug.counters().snapshot().num_created;
    tracing::debug!(
        frame,
        single_frame = ?per_frame,
        scratch = ?scratch_block,
        extent,
        created,
        "frame complete"
    );
    Ok(())
}
