//! Configuration loading and management.
//!
//! This module provides functionality to load and parse the configuration
//! and test scripts from the `.tomation/` directory structure.

pub mod error;
pub mod loader;
pub mod models;
