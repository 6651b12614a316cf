//! Boot settings

use latch_memory::{kib, EngineHeapConfig};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Used when no boot file is given.
pub const HARDCODED_BOOT_INI: &str = "[heaps]\nsingle_frame_heap_size=4048\nscratch_heap_size=4048\n";

static HARDCODED: Lazy<BootSettings> = Lazy::new(|| {
    BootSettings::from_ini_str(HARDCODED_BOOT_INI).unwrap_or_else(|err| {
        tracing::error!(%err, "hardcoded boot settings are malformed, using defaults");
        BootSettings::default()
    })
});

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read boot settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed boot settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings read once at startup
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootSettings {
    pub heaps: HeapSettings,
}

/// The `[heaps]` block. Missing keys fall back to 4 KiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapSettings {
    pub single_frame_heap_size: usize,
    pub scratch_heap_size: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            single_frame_heap_size: kib(4),
            scratch_heap_size: kib(4),
        }
    }
}

impl BootSettings {
    pub fn from_ini_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_ini_str(&text)?;
        tracing::info!(path = %path.display(), "loaded boot settings");
        Ok(settings)
    }

    /// Settings parsed from [`HARDCODED_BOOT_INI`].
    pub fn hardcoded() -> &'static BootSettings {
        &HARDCODED
    }

    pub fn heap_config(&self) -> EngineHeapConfig {
        EngineHeapConfig {
            single_frame_heap_size: self.heaps.single_frame_heap_size,
            scratch_heap_size: self.heaps.scratch_heap_size,
        }
    }
}
