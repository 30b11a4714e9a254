//! Global configuration models for `.tomation/config.toml`.
//!
//! This module defines the project-wide settings that control how a session
//! attaches to a document and how patiently it looks for elements.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

use crate::run_models::TestSpeed;

/// Represents global settings from `.tomation/config.toml`.
///
/// Every field is optional in the file.
///
/// # Example
///
/// ```toml
/// # .tomation/config.toml
/// matches = "app.example.com"
/// speed = "FAST"
/// debug = true
///
/// [locator]
/// delay_ms = 500
/// max_tries = 20
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
pub struct GlobalConfig {
    /// Substring the document URL must contain for a session to start.
    ///
    /// An empty string matches every URL.
    #[serde(default)]
    pub matches: String,

    /// Initial playback speed.
    #[serde(default)]
    pub speed: TestSpeed,

    /// Enables debug-level logging.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub locator: LocatorConfig,
}

/// Element lookup budget.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct LocatorConfig {
    /// Delay between two lookup attempts.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Attempts before an element is reported as not found.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Attempts used by `AssertNotExists` before the element is reported as
    /// still present.
    #[serde(default = "default_absent_max_tries")]
    pub absent_max_tries: u32,
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_max_tries() -> u32 {
    10
}

fn default_absent_max_tries() -> u32 {
    5
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_tries: default_max_tries(),
            absent_max_tries: default_absent_max_tries(),
        }
    }
}
