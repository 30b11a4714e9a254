//! # tm-protocol
//!
//! Protocol definitions and data models for tomation.
//!
//! This crate defines all shared data structures used for:
//! - Configuration and test script parsing (TOML config, YAML tests)
//! - Action tree summaries and run control state
//! - Messaging between the engine and its controller
//!
//! ## Modules
//!
//! - [`action_models`]: Action status, snapshot context and summaries
//! - [`config_models`]: Global configuration from config.toml
//! - [`run_models`]: Playback status, run mode, speed and keys
//! - [`script_models`]: Declarative test scripts
//! - [`ipc`]: Commands and Events between controller and engine
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for the controller
//! - Independent compilation: No dependencies on other tomation crates

pub mod action_models;
pub mod config_models;
pub mod ipc;
pub mod run_models;
pub mod script_models;

pub use action_models::*;
pub use config_models::*;
pub use ipc::*;
pub use run_models::*;
pub use script_models::*;
