//! Instance configuration.
//!
//! This module defines the settings fixed when an instance is created. It provides:
//! 1. **Defaults:** Stack limit and niceness used when a setting is omitted.
//! 2. **Structure:** [`InstanceConfig`], deserializable from JSON.
//! 3. **Validation:** Range checks run before any process is spawned.
//!
//! Configuration is supplied as JSON from the Python API, or built directly in Rust.

use serde::Deserialize;

use crate::common::error::{Error, Result};
use crate::sandbox::{MunmapFlags, SandboxFlags};

/// Default configuration constants.
mod defaults {
    /// Stack limit applied under `SandboxFlags::STACK` (128 KiB).
    ///
    /// Large enough for the kernel's initial stack frame, small enough that
    /// touching memory a few hundred KiB below the stack pointer faults.
    pub const STACK_LIMIT: u64 = 128 * 1024;

    /// Niceness applied under `SandboxFlags::CPU`, the least favored value.
    pub const NICENESS: i32 = 19;

    /// Smallest accepted stack limit (one page).
    pub const MIN_STACK_LIMIT: u64 = 4096;
}

/// Settings for one instance.
///
/// All fields are optional in JSON; omitted fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Isolation options.
    pub sandbox: SandboxFlags,
    /// Mapping classes removed before the first stop.
    pub munmap: MunmapFlags,
    /// `RLIMIT_STACK` in bytes, applied when `sandbox` contains `STACK`.
    pub stack_limit: u64,
    /// Niceness applied when `sandbox` contains `CPU`.
    pub niceness: i32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxFlags::NONE,
            munmap: MunmapFlags::NONE,
            stack_limit: defaults::STACK_LIMIT,
            niceness: defaults::NICENESS,
        }
    }
}

impl InstanceConfig {
    /// Creates a default configuration with the given flag sets.
    pub fn new(sandbox: SandboxFlags, munmap: MunmapFlags) -> Self {
        Self {
            sandbox,
            munmap,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Arguments
    ///
    /// * `json` - A JSON object such as `{"sandbox": 31, "munmap": 7}`.
    ///
    /// # Returns
    ///
    /// The configuration, or `InvalidConfiguration` if the JSON is malformed
    /// or any value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfiguration {
                what: "configuration",
                value: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks numeric settings against their accepted ranges.
    ///
    /// Flag sets are already validated by construction.
    pub fn validate(&self) -> Result<()> {
        if self.stack_limit < defaults::MIN_STACK_LIMIT {
            return Err(Error::InvalidConfiguration {
                what: "stack limit",
                value: self.stack_limit.to_string(),
            });
        }
        if !(-20..=19).contains(&self.niceness) {
            return Err(Error::InvalidConfiguration {
                what: "niceness",
                value: self.niceness.to_string(),
            });
        }
        Ok(())
    }
}
