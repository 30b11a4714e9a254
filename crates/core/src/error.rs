//! Error types for action execution and test runs.

use thiserror::Error;

use crate::environment::EnvError;

/// Failure of a single action.
///
/// Every variant except [`ActionError::Aborted`] is recoverable: the engine
/// records it on the failing action and pauses for an operator decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The locator exhausted its attempts without finding the element.
    #[error("UI Element {name} not found after {tries} tries")]
    ElementNotFound { name: String, tries: u32 },

    /// The locator exhausted its attempts while waiting for the element to go away.
    #[error("UI Element {name} still present after {tries} tries")]
    ElementStillPresent { name: String, tries: u32 },

    /// The environment rejected the effect, e.g. an assertion mismatch.
    #[error("{0}")]
    EffectFailed(String),

    /// The run was stopped manually. Unwinds the whole run.
    #[error("Test stopped manually")]
    Aborted,
}

impl ActionError {
    /// Returns true when the failure should pause the run instead of ending it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ActionError::Aborted)
    }
}

impl From<EnvError> for ActionError {
    fn from(err: EnvError) -> Self {
        ActionError::EffectFailed(err.0)
    }
}

/// Failure of a top-level run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Another run is active on the same session.
    #[error("Not able to run test while other test is running.")]
    RunAlreadyInProgress,

    /// The run was stopped manually.
    #[error("Test {id} stopped manually")]
    Aborted { id: String },

    /// No test is registered under the requested id.
    #[error("Test with id {0} not found.")]
    TaskNotRegistered(String),
}
