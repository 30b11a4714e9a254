//! # tm-core
//!
//! Execution and control engine for tomation UI tests.
//!
//! This crate provides:
//! - Element lookup by polling, with parent scoping and absence checks
//! - The action tree model and the builder that compiles it from step functions
//! - The execution engine, which turns failures into interactive pauses
//! - The run session holding playback state and the pending continuation
//! - Test registration, declarative scripts and configuration loading
//!
//! ## Modules
//!
//! - [`locator`]: Element descriptors and the polling locator
//! - [`actions`]: Action tree and leaf effects
//! - [`compiler`]: Step builder and tasks
//! - [`engine`]: Action tree execution
//! - [`session`]: Playback state and operator commands
//! - [`registry`]: Registered tests
//! - [`script`]: YAML test scripts
//! - [`config`]: Configuration loading from `.tomation/`
//! - [`environment`]: Document adapter trait and the in-memory document

pub mod actions;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod locator;
pub mod registry;
pub mod script;
pub mod session;
