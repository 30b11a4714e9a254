//! The executable action tree.
//!
//! An [`Action`] is either a composite, running its children in order, or a
//! leaf, applying one [`LeafEffect`] to the environment. Every action carries
//! a stable id, a status, the last error and the environment snapshot taken
//! around its last execution.

pub mod effects;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tm_protocol::action_models::{ActionContext, ActionStatus, ActionSummary};
use tm_protocol::ipc::Event;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::clock::Clock;
use crate::compiler::StepFn;
use crate::environment::{ElementInfo, Environment};
use crate::error::ActionError;
use crate::locator::ElementDescriptor;
use crate::session::RunSession;

/// Type tag reported for composite actions.
pub const COMPOSITE_KIND: &str = "Action";

/// How a leaf needs its element before the effect is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The effect does not target an element.
    None,

    /// Wait for the element to be present.
    Present,

    /// Check that the element is absent, with the short absence budget.
    Absent,

    /// Wait for the element to go away, with the full lookup budget.
    Removed,
}

/// Everything an effect may touch while it is applied.
pub struct EffectContext<'a> {
    pub env: &'a dyn Environment,
    pub session: &'a RunSession,
    pub clock: &'a dyn Clock,
    pub events: &'a UnboundedSender<Event>,
    /// Display name of the targeted element, if any.
    pub element: Option<&'a str>,
}

impl EffectContext<'_> {
    pub fn element_name(&self) -> &str {
        self.element.unwrap_or("UNKNOWN")
    }

    /// The located element, or an "Element X doesn't exist" failure.
    pub fn require<'t>(&self, target: Option<&'t ElementInfo>) -> Result<&'t ElementInfo, ActionError> {
        target.ok_or_else(|| {
            ActionError::EffectFailed(format!("Element {} doesn't exist", self.element_name()))
        })
    }
}

/// Environment-specific behavior of a leaf action.
#[async_trait]
pub trait LeafEffect: Send + Sync {
    /// Type tag reported in summaries, e.g. `Click`.
    fn kind(&self) -> &'static str;

    /// Human readable description, given the element display name.
    fn describe(&self, element: Option<&str>) -> String;

    /// Value shown in summaries.
    fn value(&self) -> Option<String> {
        None
    }

    fn lookup(&self) -> Lookup {
        Lookup::None
    }

    /// Applies the effect. `target` is the located element, or `None` when
    /// no lookup was made or the element is absent.
    async fn apply(
        &self,
        ctx: &EffectContext<'_>,
        target: Option<&ElementInfo>,
    ) -> Result<(), ActionError>;
}

/// An action running its children in order.
#[derive(Clone)]
pub struct CompositeAction {
    pub(crate) name: String,
    pub(crate) params: Value,
    pub(crate) steps: Vec<Action>,
    pub(crate) index: usize,
    pub(crate) build: Option<StepFn>,
}

/// An action applying a single effect.
#[derive(Clone)]
pub struct LeafAction {
    pub(crate) effect: Arc<dyn LeafEffect>,
    pub(crate) element: Option<ElementDescriptor>,
    pub(crate) tries: u32,
}

#[derive(Clone)]
pub enum ActionKind {
    Composite(CompositeAction),
    Leaf(LeafAction),
}

/// A node of the executable tree.
#[derive(Clone)]
pub struct Action {
    id: Uuid,
    pub(crate) status: ActionStatus,
    pub(crate) error: Option<String>,
    pub(crate) context: ActionContext,
    pub(crate) kind: ActionKind,
}

impl Action {
    /// Creates an empty composite. `build` fills it in when it is compiled.
    pub fn composite(name: impl Into<String>, params: Value, build: Option<StepFn>) -> Self {
        Self::with_kind(ActionKind::Composite(CompositeAction {
            name: name.into(),
            params,
            steps: Vec::new(),
            index: 0,
            build,
        }))
    }

    /// Creates a leaf targeting no element.
    pub fn leaf(effect: impl LeafEffect + 'static) -> Self {
        Self::leaf_on(effect, None)
    }

    /// Creates a leaf targeting `element`.
    pub fn leaf_on(effect: impl LeafEffect + 'static, element: Option<ElementDescriptor>) -> Self {
        Self::with_kind(ActionKind::Leaf(LeafAction {
            effect: Arc::new(effect),
            element,
            tries: 0,
        }))
    }

    fn with_kind(kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ActionStatus::Waiting,
            error: None,
            context: ActionContext::default(),
            kind,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ActionKind::Leaf(_))
    }

    /// Type tag, `Action` for composites.
    pub fn kind_tag(&self) -> &'static str {
        match &self.kind {
            ActionKind::Composite(_) => COMPOSITE_KIND,
            ActionKind::Leaf(leaf) => leaf.effect.kind(),
        }
    }

    pub fn description(&self) -> String {
        match &self.kind {
            ActionKind::Composite(composite) => composite.name.clone(),
            ActionKind::Leaf(leaf) => {
                let element = leaf.element.as_ref().map(ElementDescriptor::display_name);
                leaf.effect.describe(element.as_deref())
            }
        }
    }

    /// Children of a composite, empty for leaves.
    pub fn steps(&self) -> &[Action] {
        match &self.kind {
            ActionKind::Composite(composite) => &composite.steps,
            ActionKind::Leaf(_) => &[],
        }
    }

    /// Index of the next child to execute. Always `0` for leaves.
    pub fn cursor(&self) -> usize {
        match &self.kind {
            ActionKind::Composite(composite) => composite.index,
            ActionKind::Leaf(_) => 0,
        }
    }

    /// Element lookup attempts of a leaf, `0` for composites.
    pub fn tries(&self) -> u32 {
        match &self.kind {
            ActionKind::Leaf(leaf) => leaf.tries,
            ActionKind::Composite(_) => 0,
        }
    }

    pub fn element(&self) -> Option<&ElementDescriptor> {
        match &self.kind {
            ActionKind::Leaf(leaf) => leaf.element.as_ref(),
            ActionKind::Composite(_) => None,
        }
    }

    /// Depth-first search for an action by id.
    pub fn find(&self, id: Uuid) -> Option<&Action> {
        if self.id == id {
            return Some(self);
        }
        self.steps().iter().find_map(|child| child.find(id))
    }

    /// Serializable view of this action and its children.
    pub fn summary(&self) -> ActionSummary {
        let mut summary = ActionSummary {
            id: self.id,
            kind: self.kind_tag().to_string(),
            description: self.description(),
            status: self.status,
            error: self.error.clone(),
            context: self.context.clone(),
            element: None,
            tries: None,
            value: None,
            params: None,
            steps: None,
        };
        match &self.kind {
            ActionKind::Composite(composite) => {
                summary.params = Some(composite.params.clone());
                summary.steps = Some(composite.steps.iter().map(Action::summary).collect());
            }
            ActionKind::Leaf(leaf) => {
                summary.value = leaf.effect.value();
                if let Some(element) = &leaf.element {
                    summary.element = Some(element.display_name());
                    summary.tries = Some(leaf.tries);
                }
            }
        }
        summary
    }

    /// Returns the action and all its descendants to `Waiting`, clearing
    /// errors, snapshots, attempt counters and cursors.
    pub fn reset(&mut self) {
        self.status = ActionStatus::Waiting;
        self.error = None;
        self.context = ActionContext::default();
        match &mut self.kind {
            ActionKind::Composite(composite) => {
                composite.index = 0;
                composite.steps.iter_mut().for_each(Action::reset);
            }
            ActionKind::Leaf(leaf) => leaf.tries = 0,
        }
    }

    pub(crate) fn reset_tries(&mut self) {
        if let ActionKind::Leaf(leaf) = &mut self.kind {
            leaf.tries = 0;
        }
    }

    pub(crate) fn set_tries(&mut self, tries: u32) {
        if let ActionKind::Leaf(leaf) = &mut self.kind {
            leaf.tries = tries;
        }
    }

    pub(crate) fn mark_skipped(&mut self) {
        self.status = ActionStatus::Skipped;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = ActionStatus::Stopped;
        self.error = Some(ActionError::Aborted.to_string());
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("type", &self.kind_tag())
            .field("description", &self.description())
            .field("status", &self.status)
            .field("error", &self.error)
            .field("steps", &self.steps())
            .finish()
    }
}
