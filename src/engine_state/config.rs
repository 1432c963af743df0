//! # Engine Configuration
//!
//! Settings that shape the cross-thread core: how many frames may be in flight, how much
//! memory each frame's command arena starts with, and what the engine's threads are called.
//! Loaded from JSON; every field is optional and falls back to its default.
//!
//! ```json
//! {
//!     "swapchain_frame_count": 2,
//!     "command_arena_capacity": 4096,
//!     "render_thread_name": "render",
//!     "resource_worker_name": "resource-upload"
//! }
//! ```

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::arena::RECORD_ALIGN;

/// Smallest accepted `command_arena_capacity`.
pub const MIN_COMMAND_ARENA_CAPACITY: usize = 64;

/// Errors produced while loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read engine config: {0}")]
    Io(#[from] io::Error),
    /// The configuration is not valid JSON for [`EngineConfig`].
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    /// `swapchain_frame_count` was zero.
    #[error("swapchain_frame_count must be at least 1, got {0}")]
    InvalidFrameCount(usize),
    /// `command_arena_capacity` was too small or not a multiple of the record alignment.
    #[error("command_arena_capacity must be a multiple of 8 and at least 64, got {0}")]
    InvalidArenaCapacity(usize),
}

/// Engine-wide settings for the frame ring, arenas and threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of swapchain images; the frame ring holds one more slot than this
    pub swapchain_frame_count: usize,
    /// Bytes reserved by each frame's command arena on its first push
    pub command_arena_capacity: usize,
    /// Name of the render (consumer) thread
    pub render_thread_name: String,
    /// Name of the resource upload worker thread
    pub resource_worker_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            swapchain_frame_count: 2,
            command_arena_capacity: 4096,
            render_thread_name: "render".to_string(),
            resource_worker_name: "resource-upload".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Number of slots in the frame ring.
    pub fn ring_length(&self) -> usize {
        self.swapchain_frame_count + 1
    }

    /// Checks the values the core depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.swapchain_frame_count == 0 {
            return Err(ConfigError::InvalidFrameCount(self.swapchain_frame_count));
        }
        if self.command_arena_capacity < MIN_COMMAND_ARENA_CAPACITY
            || self.command_arena_capacity % RECORD_ALIGN != 0
        {
            return Err(ConfigError::InvalidArenaCapacity(
                self.command_arena_capacity,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_a_three_slot_ring() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ring_length(), 3);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "swapchain_frame_count": 3 }"#).unwrap();
        assert_eq!(config.swapchain_frame_count, 3);
        assert_eq!(config.ring_length(), 4);
        assert_eq!(config.render_thread_name, "render");
    }

    #[test]
    fn rejects_zero_frames() {
        let err = EngineConfig::from_json_str(r#"{ "swapchain_frame_count": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameCount(0)));
    }

    #[test]
    fn rejects_unaligned_arena_capacity() {
        let err = EngineConfig::from_json_str(r#"{ "command_arena_capacity": 100 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArenaCapacity(100)));

        let err = EngineConfig::from_json_str(r#"{ "command_arena_capacity": 8 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArenaCapacity(8)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "swapchain_frame_count": 1, "resource_worker_name": "uploads" }}"#
        )
        .unwrap();

        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.ring_length(), 2);
        assert_eq!(config.resource_worker_name, "uploads");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig {
            swapchain_frame_count: 4,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }
}
