//! Test script models for `.tomation/tests/*.yaml`.
//!
//! A test script declares named elements, reusable tasks and the ordered
//! steps of a test. Scripts are compiled into action trees by the core
//! crate; this module only describes the file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::run_models::Key;

/// A complete test definition.
///
/// # Example
///
/// ```yaml
/// id: login
/// elements:
///   login-form:
///     query: "#login"
///   username:
///     query: input
///     parent: login-form
///     index: 0
///   submit:
///     query: button
///     parent: login-form
/// tasks:
///   fill-credentials:
///     - type: { value: "${user}", element: username }
///     - click: submit
/// steps:
///   - task: { id: fill-credentials, params: { user: alice } }
///   - assert: { element: submit, exists: true }
///   - wait: 500
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct TestScript {
    /// Identifier used to run the test.
    pub id: String,

    /// Element descriptors keyed by name.
    #[serde(default)]
    pub elements: BTreeMap<String, ElementSpec>,

    /// Reusable step lists keyed by task id.
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<ScriptStep>>,

    /// Top-level steps of the test.
    pub steps: Vec<ScriptStep>,
}

/// Declarative element descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ElementSpec {
    /// Tag name, `#id` or `.class` query.
    pub query: String,

    /// Name of the element whose match is used as search root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub parent: Option<String>,

    /// Only accept the n-th visible match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub index: Option<usize>,
}

/// A single script step.
///
/// Steps are single-key maps, e.g. `click: submit` or
/// `wait-until-removed: spinner`. Steps without arguments take an empty
/// map: `pause: {}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptStep {
    Click(String),

    Type(ValueStep),

    TypePassword(ValueStep),

    ClearValue(String),

    Select(ValueStep),

    PressKey(KeyStep),

    Assert(AssertStep),

    SaveValue(SaveValueStep),

    /// Milliseconds to wait.
    Wait(u64),

    WaitUntilRemoved(String),

    Pause {},

    /// Manual step description shown to the operator.
    Manual(String),

    ReloadPage {},

    Task(TaskCall),
}

/// Arguments of `type`, `type-password` and `select`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ValueStep {
    pub value: String,
    pub element: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct KeyStep {
    pub key: Key,
    pub element: String,
}

/// Arguments of `assert`.
///
/// Exactly one check must be given.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
pub struct AssertStep {
    pub element: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub text_is: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub contains_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub value_is: Option<String>,

    /// `true` asserts presence, `false` asserts absence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub exists: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct SaveValueStep {
    pub element: String,
    pub slot: String,
}

/// Invocation of a task declared in the same script.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct TaskCall {
    pub id: String,

    /// Values substituted for `${name}` placeholders in the task's steps.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}
