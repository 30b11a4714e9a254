//! Messaging protocol between the engine and its controller.
//!
//! The controller (typically a browser extension panel) sends `Command`s to
//! the engine and observes the run through `Event`s:
//! - `Command`: run requests, playback control and operator decisions
//! - `Event`: action updates, run lifecycle and playback notifications
//!
//! Both directions are fire-and-forget and order-preserving. Names on the
//! wire mirror the event names the controller already understands.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::action_models::ActionSummary;
use crate::run_models::TestSpeed;

/// Commands sent from the controller to the engine.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// { "type": "runTest", "payload": { "test_id": "login" } }
/// { "type": "skipAction" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Command {
    /// Start a registered test.
    RunTest { test_id: String },

    /// Reload test definitions from disk.
    ReloadTests,

    /// Pause at the next pause gate.
    Pause,

    /// Abort the current run.
    Stop,

    /// Resume in normal mode.
    Continue,

    /// Resume in step-by-step mode, pausing after the next leaf action.
    NextStep,

    /// Resume and re-attempt the paused action with a fresh lookup budget.
    RetryAction,

    /// Mark the paused action as skipped and move on.
    SkipAction,

    /// Accept a pending manual step.
    UserAccept,

    /// Reject a pending manual step.
    UserReject,
}

/// Events sent from the engine to the controller.
///
/// ```json
/// {
///   "type": "actionUpdate",
///   "payload": { "action": { "id": "...", "status": "RUNNING", "...": "..." } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// An action changed status, context or attempt count.
    ActionUpdate { action: ActionSummary },

    /// A `SaveValue` action read a value into a named memory slot.
    SaveValue {
        memory_slot_name: String,
        value: String,
    },

    /// A test was registered and compiled.
    RegisterTest { id: String, action: ActionSummary },

    /// A top-level run started.
    TestStarted { action: ActionSummary },

    /// A top-level run completed without being stopped.
    TestPassed { id: String },

    /// A top-level run was aborted.
    TestFailed { id: String, error: String },

    /// A top-level run ended, whatever the outcome.
    TestEnd { action: ActionSummary },

    TestStop,

    TestPause,

    TestPlay,

    UserAccept,

    UserReject,

    /// Announces a new engine session to the controller.
    SessionInit {
        speed: TestSpeed,
        #[ts(type = "string")]
        session_id: Uuid,
    },
}
