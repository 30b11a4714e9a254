//! Registered tests, addressable by id.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tm_protocol::action_models::ActionSummary;
use tm_protocol::ipc::Event;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::actions::Action;
use crate::compiler::Task;
use crate::engine::Engine;
use crate::error::RunError;
use serde_json::Value;

/// Compiled tests keyed by id.
#[derive(Default)]
pub struct TestRegistry {
    tests: RwLock<BTreeMap<String, Action>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `task` and stores the tree under its id, replacing any
    /// previous test with the same id. Emits `RegisterTest`.
    pub fn register(&self, task: &Task, events: &UnboundedSender<Event>) -> ActionSummary {
        let action = task.compile(Value::Null);
        let summary = action.summary();
        info!(test = %task.id(), "Register test");
        let _ = events.send(Event::RegisterTest {
            id: task.id().to_string(),
            action: summary.clone(),
        });
        self.tests.write().insert(task.id().to_string(), action);
        summary
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.tests.read().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tests.read().contains_key(id)
    }

    /// Summary of the stored tree for `id`.
    pub fn compiled(&self, id: &str) -> Option<ActionSummary> {
        self.tests.read().get(id).map(Action::summary)
    }

    pub fn clear(&self) {
        self.tests.write().clear();
    }

    /// Runs the test registered under `id` and returns the executed tree.
    ///
    /// The run works on a copy of the stored tree, so action ids match the
    /// ones announced by `RegisterTest`.
    ///
    /// # Errors
    ///
    /// - `RunError::TaskNotRegistered` if no test has this id
    /// - any error returned by [`Engine::run`]
    pub async fn run(&self, engine: &Engine, id: &str) -> Result<Action, RunError> {
        let mut action = self
            .tests
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RunError::TaskNotRegistered(id.to_string()))?;
        engine.run(&mut action).await?;
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn register_emits_and_stores() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = TestRegistry::new();
        let task = Task::new("Smoke", |s, _| s.wait(10));

        let summary = registry.register(&task, &tx);

        assert_eq!(registry.ids(), vec!["Smoke".to_string()]);
        assert_eq!(registry.compiled("Smoke").map(|s| s.id), Some(summary.id));
        match rx.try_recv().unwrap() {
            Event::RegisterTest { id, action } => {
                assert_eq!(id, "Smoke");
                assert_eq!(action.steps.unwrap().len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn clear_forgets_everything() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = TestRegistry::new();
        registry.register(&Task::new("A", |_, _| {}), &tx);
        registry.register(&Task::new("B", |_, _| {}), &tx);
        assert!(registry.contains("A"));

        registry.clear();

        assert!(registry.ids().is_empty());
        assert!(registry.compiled("A").is_none());
    }
}
