//! Common test utilities shared by the integration tests.
//!
//! This module provides:
//! - Test fixtures (documents, engine harness, recording clock)
//! - Event assertions

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
