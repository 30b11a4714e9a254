//! Action tree models shared between the engine and its observers.
//!
//! This module defines the serializable view of an executable test tree:
//! the status machine of a single action, the environment snapshot captured
//! around its execution, and the summary sent to the controller after every
//! status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle status of a single action.
///
/// Normal progression is `Waiting -> Running -> Success`. A failing action
/// moves `Running -> Error -> Paused` and waits there for an operator
/// decision:
/// - continue / retry: back to `Running`
/// - skip: `Skipped`
/// - stop: `Stopped`
///
/// `Success` and `Skipped` are terminal for an action instance until it is
/// reset.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    /// Compiled but not executed yet.
    #[default]
    Waiting,

    /// Currently executing.
    Running,

    /// Failed and waiting for continue, retry, skip or stop.
    Paused,

    /// Completed successfully.
    Success,

    /// Failed. Transient: the engine moves the action to `Paused` right away
    /// unless the run was aborted.
    Error,

    /// Skipped by the operator.
    Skipped,

    /// Aborted by a manual stop.
    Stopped,
}

impl ActionStatus {
    /// Returns true when the action will not run again without a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Skipped | Self::Stopped)
    }
}

/// Environment snapshot bracketing the execution of an action.
///
/// The payloads are opaque to the engine. They are produced by the
/// environment adapter and only used for diagnostics in the controller UI.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    /// Document snapshot taken right after the action entered `Running`.
    #[ts(type = "unknown")]
    pub before_snapshot: Value,

    /// Document snapshot taken after the action finished, whatever the outcome.
    #[ts(type = "unknown")]
    pub after_snapshot: Value,

    /// Form input values before execution.
    #[ts(type = "unknown")]
    pub before_values: Value,

    /// Form input values after execution.
    #[ts(type = "unknown")]
    pub after_values: Value,

    /// URL of the document when the action started.
    pub url: String,

    pub start_timestamp: Option<DateTime<Utc>>,

    pub end_timestamp: Option<DateTime<Utc>>,
}

/// Serializable summary of an action, emitted after every transition.
///
/// Leaf actions fill in `element`, `tries` and `value` where they apply.
/// Composite actions fill in `params` and `steps`, the latter holding the
/// nested summaries of their children in execution order.
///
/// ```json
/// {
///   "id": "5d1f...",
///   "type": "Click",
///   "description": "Click in Submit in Login form",
///   "status": "PAUSED",
///   "error": "UI Element Submit in Login form not found after 10 tries",
///   "context": { "url": "https://app.test/login", "...": "..." },
///   "element": "Submit in Login form",
///   "tries": 9
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ActionSummary {
    #[ts(type = "string")]
    pub id: Uuid,

    /// Action type tag, e.g. `Click`, `AssertTextIs` or `Action` for composites.
    #[serde(rename = "type")]
    pub kind: String,

    /// Human readable description shown by the controller.
    pub description: String,

    pub status: ActionStatus,

    /// Last failure message, cleared on every fresh execution.
    pub error: Option<String>,

    pub context: ActionContext,

    /// Display name of the targeted element, e.g. `Submit in Login form`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub element: Option<String>,

    /// 0-based index of the latest element lookup attempt, so an exhausted
    /// lookup of `max_tries` attempts reports `max_tries - 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tries: Option<u32>,

    /// Value typed, selected, asserted or saved by the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub value: Option<String>,

    /// Parameters a composite was compiled with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, type = "unknown")]
    pub params: Option<Value>,

    /// Child summaries of a composite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub steps: Option<Vec<ActionSummary>>,
}

impl ActionSummary {
    /// Depth-first search for a nested summary by action id.
    pub fn find(&self, id: Uuid) -> Option<&ActionSummary> {
        if self.id == id {
            return Some(self);
        }
        self.steps
            .iter()
            .flatten()
            .find_map(|child| child.find(id))
    }
}
