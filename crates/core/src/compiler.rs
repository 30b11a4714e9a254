//! Builds action trees from step functions.
//!
//! A step function receives a [`Steps`] builder and calls its DSL helpers
//! (`click`, `type_text`, `assert`, `task`, ...). Every helper appends a new
//! action to the builder's current container. Invoking a [`Task`] from inside
//! a step function swaps in a fresh composite as the current container, runs
//! the task's own step function, then restores the previous container and
//! appends the finished composite to it. Trees therefore nest exactly like
//! the step function calls do.
//!
//! ```
//! use serde_json::json;
//! use tm_core::compiler::Task;
//! use tm_core::locator::ElementDescriptor;
//!
//! let form = ElementDescriptor::identified_by("login").named("Login form");
//! let user = ElementDescriptor::query("input").child_of(&form).named("User");
//! let submit = ElementDescriptor::query("button").child_of(&form).named("Submit");
//!
//! let login = Task::new("Login", move |s, params| {
//!     let name = params["user"].as_str().unwrap_or_default();
//!     s.type_text(name, &user);
//!     s.click(&submit);
//! });
//!
//! let test = Task::new("Smoke test", move |s, _| {
//!     s.task(&login, json!({ "user": "alice" }));
//!     s.wait(500);
//! });
//!
//! let tree = test.compile(json!(null));
//! assert_eq!(tree.steps().len(), 2);
//! assert_eq!(tree.steps()[0].steps().len(), 2);
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tm_protocol::run_models::Key;
use tracing::debug;

use crate::actions::effects::{
    AssertContainsText, AssertExists, AssertNotExists, AssertTextIs, AssertValueIs, Click, ManualStep,
    Pause, PressKey, ReloadPage, SaveValue, Select, TypeText, Wait, WaitUntilRemoved,
};
use crate::actions::{Action, ActionKind};
use crate::locator::ElementDescriptor;

/// A step-registration function. Receives the builder and the parameters
/// the surrounding task was invoked with.
pub type StepFn = Arc<dyn Fn(&mut Steps, &Value) + Send + Sync>;

/// Builder context tracking the current container during compilation.
pub struct Steps {
    current: Action,
}

impl Steps {
    /// Compiles `container` by running its step function with it as the
    /// current container. Any children it already had are discarded.
    pub fn compile(container: Action) -> Action {
        let mut steps = Steps { current: container };
        steps.run_build();
        steps.current
    }

    /// Makes `container` the current container while its step function
    /// runs, then appends it to the previous one.
    pub fn build(&mut self, container: Action) {
        let previous = std::mem::replace(&mut self.current, container);
        self.run_build();
        let built = std::mem::replace(&mut self.current, previous);
        self.add(built);
    }

    fn run_build(&mut self) {
        let ActionKind::Composite(composite) = &mut self.current.kind else {
            return;
        };
        composite.steps.clear();
        composite.index = 0;
        let Some(build) = composite.build.clone() else {
            return;
        };
        let params = composite.params.clone();
        debug!(action = %composite.name, "Compile");
        build(self, &params);
    }

    /// Appends an action to the current container.
    pub fn add(&mut self, action: Action) {
        debug!(action = %action.description(), "Add action");
        if let ActionKind::Composite(composite) = &mut self.current.kind {
            composite.steps.push(action);
        }
    }

    /// Description of the current container.
    pub fn container_name(&self) -> String {
        self.current.description()
    }

    pub fn click(&mut self, element: &ElementDescriptor) {
        self.add(Action::leaf_on(Click, Some(element.clone())));
    }

    pub fn type_text(&mut self, value: impl Into<String>, element: &ElementDescriptor) {
        self.add(Action::leaf_on(
            TypeText {
                value: value.into(),
                password: false,
            },
            Some(element.clone()),
        ));
    }

    pub fn type_password(&mut self, value: impl Into<String>, element: &ElementDescriptor) {
        self.add(Action::leaf_on(
            TypeText {
                value: value.into(),
                password: true,
            },
            Some(element.clone()),
        ));
    }

    pub fn clear_value(&mut self, element: &ElementDescriptor) {
        self.type_text("", element);
    }

    pub fn select(&mut self, value: impl Into<String>, element: &ElementDescriptor) {
        self.add(Action::leaf_on(
            Select {
                value: value.into(),
            },
            Some(element.clone()),
        ));
    }

    pub fn press_key(&mut self, key: Key, element: &ElementDescriptor) {
        self.add(Action::leaf_on(PressKey { key }, Some(element.clone())));
    }

    /// Starts an assertion on `element`.
    pub fn assert<'s>(&'s mut self, element: &ElementDescriptor) -> Assertion<'s> {
        Assertion {
            steps: self,
            element: element.clone(),
        }
    }

    pub fn save_value(&mut self, element: &ElementDescriptor, slot: impl Into<String>) {
        self.add(Action::leaf_on(SaveValue { slot: slot.into() }, Some(element.clone())));
    }

    pub fn wait(&mut self, millis: u64) {
        self.add(Action::leaf(Wait { millis }));
    }

    pub fn wait_until_removed(&mut self, element: &ElementDescriptor) {
        self.add(Action::leaf_on(WaitUntilRemoved, Some(element.clone())));
    }

    pub fn pause(&mut self) {
        self.add(Action::leaf(Pause));
    }

    pub fn manual_task(&mut self, description: impl Into<String>) {
        self.add(Action::leaf(ManualStep {
            description: description.into(),
        }));
    }

    pub fn reload_page(&mut self) {
        self.add(Action::leaf(ReloadPage));
    }

    /// Appends `task` as a nested composite compiled with `params`.
    pub fn task(&mut self, task: &Task, params: Value) {
        self.build(task.container(params));
    }
}

/// Assertion builder returned by [`Steps::assert`].
pub struct Assertion<'s> {
    steps: &'s mut Steps,
    element: ElementDescriptor,
}

impl Assertion<'_> {
    pub fn text_is(self, text: impl Into<String>) {
        self.steps
            .add(Action::leaf_on(AssertTextIs { text: text.into() }, Some(self.element)));
    }

    pub fn contains_text(self, text: impl Into<String>) {
        self.steps
            .add(Action::leaf_on(AssertContainsText { text: text.into() }, Some(self.element)));
    }

    pub fn value_is(self, value: impl Into<String>) {
        self.steps
            .add(Action::leaf_on(AssertValueIs { value: value.into() }, Some(self.element)));
    }

    pub fn exists(self) {
        self.steps.add(Action::leaf_on(AssertExists, Some(self.element)));
    }

    pub fn not_exists(self) {
        self.steps.add(Action::leaf_on(AssertNotExists, Some(self.element)));
    }
}

/// A named, reusable step function.
///
/// Inside another step function a task is appended with [`Steps::task`].
/// On its own it is compiled with [`Task::compile`] and run as a top-level
/// run by [`Engine::run_task`](crate::engine::Engine::run_task).
#[derive(Clone)]
pub struct Task {
    id: String,
    build: StepFn,
}

impl Task {
    pub fn new(id: impl Into<String>, build: impl Fn(&mut Steps, &Value) + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            build: Arc::new(build),
        }
    }

    pub fn from_step_fn(id: impl Into<String>, build: StepFn) -> Self {
        Self { id: id.into(), build }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Empty composite for this task, compiled on demand.
    pub fn container(&self, params: Value) -> Action {
        Action::composite(self.id.clone(), params, Some(self.build.clone()))
    }

    /// Compiles the whole tree of this task.
    pub fn compile(&self, params: Value) -> Action {
        debug!(task = %self.id, "Compilation starts");
        let action = Steps::compile(self.container(params));
        debug!(task = %self.id, steps = action.steps().len(), "Compilation finished");
        action
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}
