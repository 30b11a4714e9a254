//! Compiles declarative test scripts into tasks.
//!
//! A [`TestScript`] names its elements and tasks and lists its steps. The
//! script is validated first (every referenced element and task must exist,
//! element parents and task calls must not form cycles, each assertion must
//! carry exactly one check), then turned into a [`Task`] whose step function
//! drives the same builder helpers a hand-written step function would.
//!
//! Values in task steps may contain `${name}` placeholders, filled from the
//! params of the task invocation.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tm_protocol::script_models::{AssertStep, ElementSpec, ScriptStep, TestScript};
use tracing::{debug, warn};

use crate::compiler::{Steps, Task};
use crate::environment::filters;
use crate::locator::ElementDescriptor;

/// Reasons a script cannot be compiled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Test '{script}' references unknown element '{element}'")]
    UnknownElement { script: String, element: String },

    #[error("Test '{script}' references unknown task '{task}'")]
    UnknownTask { script: String, task: String },

    #[error("Test '{script}': element '{element}' is its own ancestor")]
    ElementCycle { script: String, element: String },

    #[error("Test '{script}': task '{task}' calls itself")]
    TaskCycle { script: String, task: String },

    #[error("Test '{script}': assertion on '{element}' must have exactly one check")]
    InvalidAssertion { script: String, element: String },
}

/// Validated script content shared by the step functions of a script.
struct CompiledScript {
    elements: BTreeMap<String, ElementDescriptor>,
    tasks: BTreeMap<String, Vec<ScriptStep>>,
}

/// Compiles every script, stopping at the first invalid one.
///
/// # Errors
///
/// Returns the first `ScriptError` found.
pub fn compile_scripts(scripts: &[TestScript]) -> Result<Vec<Task>, ScriptError> {
    scripts.iter().map(compile_script).collect()
}

/// Validates `script` and turns it into a task named after the script id.
///
/// # Errors
///
/// - `ScriptError::UnknownElement` / `ScriptError::UnknownTask` for dangling references
/// - `ScriptError::ElementCycle` / `ScriptError::TaskCycle` for cyclic definitions
/// - `ScriptError::InvalidAssertion` for an assertion without exactly one check
pub fn compile_script(script: &TestScript) -> Result<Task, ScriptError> {
    let mut elements = BTreeMap::new();
    for name in script.elements.keys() {
        build_element(script, name, &mut elements, &mut Vec::new())?;
    }

    validate_steps(script, &script.steps)?;
    for steps in script.tasks.values() {
        validate_steps(script, steps)?;
    }
    for task in script.tasks.keys() {
        check_task_cycle(script, task, &mut Vec::new())?;
    }

    let compiled = Arc::new(CompiledScript {
        elements,
        tasks: script.tasks.clone(),
    });
    let steps = script.steps.clone();
    debug!(test = %script.id, "Script compiled");

    Ok(Task::new(script.id.clone(), move |s, params| {
        compiled.apply(s, &steps, params)
    }))
}

fn build_element(
    script: &TestScript,
    name: &str,
    built: &mut BTreeMap<String, ElementDescriptor>,
    path: &mut Vec<String>,
) -> Result<ElementDescriptor, ScriptError> {
    if let Some(descriptor) = built.get(name) {
        return Ok(descriptor.clone());
    }
    if path.iter().any(|seen| seen == name) {
        return Err(ScriptError::ElementCycle {
            script: script.id.clone(),
            element: name.to_string(),
        });
    }
    let spec: &ElementSpec = script.elements.get(name).ok_or_else(|| ScriptError::UnknownElement {
        script: script.id.clone(),
        element: name.to_string(),
    })?;

    path.push(name.to_string());
    let mut builder = ElementDescriptor::query(spec.query.clone());
    if let Some(index) = spec.index {
        builder = builder.matching(filters::nth(index));
    }
    if let Some(parent) = &spec.parent {
        let parent = build_element(script, parent, built, path)?;
        builder = builder.child_of(&parent);
    }
    path.pop();

    let descriptor = builder.named(name);
    built.insert(name.to_string(), descriptor.clone());
    Ok(descriptor)
}

fn validate_steps(script: &TestScript, steps: &[ScriptStep]) -> Result<(), ScriptError> {
    let element = |name: &str| {
        if script.elements.contains_key(name) {
            Ok(())
        } else {
            Err(ScriptError::UnknownElement {
                script: script.id.clone(),
                element: name.to_string(),
            })
        }
    };

    for step in steps {
        match step {
            ScriptStep::Click(name) | ScriptStep::ClearValue(name) | ScriptStep::WaitUntilRemoved(name) => {
                element(name)?
            }
            ScriptStep::Type(step) | ScriptStep::TypePassword(step) | ScriptStep::Select(step) => {
                element(&step.element)?
            }
            ScriptStep::PressKey(step) => element(&step.element)?,
            ScriptStep::SaveValue(step) => element(&step.element)?,
            ScriptStep::Assert(step) => {
                element(&step.element)?;
                if checks(step) != 1 {
                    return Err(ScriptError::InvalidAssertion {
                        script: script.id.clone(),
                        element: step.element.clone(),
                    });
                }
            }
            ScriptStep::Task(call) => {
                if !script.tasks.contains_key(&call.id) {
                    return Err(ScriptError::UnknownTask {
                        script: script.id.clone(),
                        task: call.id.clone(),
                    });
                }
            }
            ScriptStep::Wait(_)
            | ScriptStep::Pause {}
            | ScriptStep::Manual(_)
            | ScriptStep::ReloadPage {} => {}
        }
    }
    Ok(())
}

fn checks(step: &AssertStep) -> usize {
    [
        step.text_is.is_some(),
        step.contains_text.is_some(),
        step.value_is.is_some(),
        step.exists.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count()
}

fn check_task_cycle(script: &TestScript, task: &str, path: &mut Vec<String>) -> Result<(), ScriptError> {
    if path.iter().any(|seen| seen == task) {
        return Err(ScriptError::TaskCycle {
            script: script.id.clone(),
            task: task.to_string(),
        });
    }
    path.push(task.to_string());
    let calls = script.tasks.get(task).into_iter().flatten().filter_map(|step| match step {
        ScriptStep::Task(call) => Some(call.id.as_str()),
        _ => None,
    });
    for callee in calls {
        check_task_cycle(script, callee, path)?;
    }
    path.pop();
    Ok(())
}

/// Replaces `${name}` with the string param `name`. Unknown placeholders are
/// kept as they are.
fn interpolate(text: &str, params: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let key = &rest[start + 2..start + len];
        out.push_str(&rest[..start]);
        match params.get(key) {
            Some(Value::String(value)) => out.push_str(value),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&rest[start..=start + len]),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

impl CompiledScript {
    fn apply(self: &Arc<Self>, s: &mut Steps, steps: &[ScriptStep], params: &Value) {
        for step in steps {
            self.apply_step(s, step, params);
        }
    }

    fn apply_step(self: &Arc<Self>, s: &mut Steps, step: &ScriptStep, params: &Value) {
        let text = |value: &str| interpolate(value, params);
        match step {
            ScriptStep::Click(name) => self.with_element(name, |el| s.click(el)),
            ScriptStep::Type(step) => self.with_element(&step.element, |el| s.type_text(text(&step.value), el)),
            ScriptStep::TypePassword(step) => {
                self.with_element(&step.element, |el| s.type_password(text(&step.value), el))
            }
            ScriptStep::ClearValue(name) => self.with_element(name, |el| s.clear_value(el)),
            ScriptStep::Select(step) => self.with_element(&step.element, |el| s.select(text(&step.value), el)),
            ScriptStep::PressKey(step) => self.with_element(&step.element, |el| s.press_key(step.key, el)),
            ScriptStep::Assert(step) => self.with_element(&step.element, |el| {
                let assertion = s.assert(el);
                if let Some(expected) = &step.text_is {
                    assertion.text_is(text(expected));
                } else if let Some(expected) = &step.contains_text {
                    assertion.contains_text(text(expected));
                } else if let Some(expected) = &step.value_is {
                    assertion.value_is(text(expected));
                } else if step.exists == Some(false) {
                    assertion.not_exists();
                } else {
                    assertion.exists();
                }
            }),
            ScriptStep::SaveValue(step) => self.with_element(&step.element, |el| s.save_value(el, text(&step.slot))),
            ScriptStep::Wait(millis) => s.wait(*millis),
            ScriptStep::WaitUntilRemoved(name) => self.with_element(name, |el| s.wait_until_removed(el)),
            ScriptStep::Pause {} => s.pause(),
            ScriptStep::Manual(description) => s.manual_task(text(description)),
            ScriptStep::ReloadPage {} => s.reload_page(),
            ScriptStep::Task(call) => {
                let Some(steps) = self.tasks.get(&call.id).cloned() else {
                    warn!(task = %call.id, "Unknown task, step ignored");
                    return;
                };
                let call_params: serde_json::Map<String, Value> = call
                    .params
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(text(value))))
                    .collect();
                let script = Arc::clone(self);
                let task = Task::new(call.id.clone(), move |s, params| script.apply(s, &steps, params));
                s.task(&task, Value::Object(call_params));
            }
        }
    }

    fn with_element(&self, name: &str, f: impl FnOnce(&ElementDescriptor)) {
        match self.elements.get(name) {
            Some(element) => f(element),
            None => warn!(element = %name, "Unknown element, step ignored"),
        }
    }
}
