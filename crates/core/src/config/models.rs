//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! global settings and test scripts, and the `EngineConfig` derived from
//! them for the execution engine.

use std::time::Duration;
use tm_protocol::config_models::GlobalConfig;
use tm_protocol::script_models::TestScript;

use crate::locator::LocateOptions;

/// Unified application configuration loaded from the `.tomation/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Global settings
/// - `tests/*.yaml`: Test scripts
///
/// # Example
///
/// ```rust,no_run
/// use tm_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} tests", config.tests.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// All test scripts loaded from `tests/*.yaml`, ordered by file name.
    pub tests: Vec<TestScript>,
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::from(&self.global)
    }
}

/// Element lookup settings used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between two lookup attempts.
    pub locate_delay: Duration,

    /// Attempts before an element is reported as not found.
    pub max_tries: u32,

    /// Attempts used when asserting that an element does not exist.
    pub absent_max_tries: u32,
}

impl EngineConfig {
    /// Options for a regular presence lookup.
    pub fn presence(&self) -> LocateOptions {
        LocateOptions {
            delay: self.locate_delay,
            max_tries: self.max_tries,
            until_absent: false,
        }
    }

    /// Options for an absence check with the given attempt budget.
    pub fn absence(&self, max_tries: u32) -> LocateOptions {
        LocateOptions {
            delay: self.locate_delay,
            max_tries,
            until_absent: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for EngineConfig {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            locate_delay: Duration::from_millis(global.locator.delay_ms),
            max_tries: global.locator.max_tries,
            absent_max_tries: global.locator.absent_max_tries,
        }
    }
}
