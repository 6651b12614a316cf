//! Latch Services Layer
//!
//! Boot-time platform services: settings and engine memory setup.

pub mod settings;

use latch_memory::{engine, AllocError};
use settings::BootSettings;

/// Bring up engine services from boot settings.
pub fn init_services(settings: &BootSettings) -> Result<(), AllocError> {
    tracing::debug!(?settings, "initializing services");
    engine::init(settings.heap_config())
}

/// Tear down everything `init_services` created.
pub fn shutdown_services() {
    engine::shutdown();
}
