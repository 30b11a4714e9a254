//! Action tree execution engine.
//!
//! The [`Engine`] walks a compiled action tree depth-first. Composite actions
//! run their children strictly in index order, awaiting the session's step
//! delay before each one. Leaf actions locate their element through the
//! [`Locator`] and apply their effect to the environment.
//!
//! Failures are interactive checkpoints: any error other than the abort
//! signal is recorded on the failing action, which moves to `PAUSED`, and
//! playback is paused. The enclosing composite then waits at the pause gate
//! until the operator continues, retries, skips or stops. Only
//! [`ActionError::Aborted`] unwinds the whole run.

use async_recursion::async_recursion;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tm_protocol::action_models::{ActionContext, ActionStatus};
use tm_protocol::ipc::Event;
use tm_protocol::run_models::RunMode;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::actions::{Action, ActionKind, EffectContext, Lookup};
use crate::clock::Clock;
use crate::compiler::Task;
use crate::config::models::EngineConfig;
use crate::environment::Environment;
use crate::error::{ActionError, RunError};
use crate::locator::{ElementDescriptor, LocateOptions, LocateProbe, Located, Locator, ProbeDirective};
use crate::session::{Resume, RunSession};

/// How an action body ended when it did not fail.
enum Completion {
    Done,
    Skipped,
}

/// Drives action trees against an environment.
///
/// Cheap to clone; clones share the session, environment and event sink.
#[derive(Clone)]
pub struct Engine {
    env: Arc<dyn Environment>,
    session: Arc<RunSession>,
    clock: Arc<dyn Clock>,
    events: UnboundedSender<Event>,
    config: EngineConfig,
    locator: Locator,
}

impl Engine {
    /// Create a new Engine.
    ///
    /// # Arguments
    ///
    /// * `env` - The document the actions are applied to
    /// * `session` - Playback state shared with the operator
    /// * `clock` - Time source for lookup and step delays
    /// * `events` - Channel receiving action and run notifications
    /// * `config` - Element lookup settings
    pub fn new(
        env: Arc<dyn Environment>,
        session: Arc<RunSession>,
        clock: Arc<dyn Clock>,
        events: UnboundedSender<Event>,
        config: EngineConfig,
    ) -> Self {
        let locator = Locator::new(env.clone(), clock.clone());
        Self {
            env,
            session,
            clock,
            events,
            config,
            locator,
        }
    }

    pub fn session(&self) -> &Arc<RunSession> {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `root` as a top-level test run.
    ///
    /// This is the main entry point for execution. It:
    /// 1. Claims the session, rejecting the run if another one is active
    /// 2. Resets the tree and emits `TestStarted`
    /// 3. Executes the tree, suspending at the pause gate as instructed
    /// 4. Emits `TestPassed` or `TestFailed`
    /// 5. Releases the session and emits `TestEnd`
    ///
    /// # Errors
    ///
    /// - `RunError::RunAlreadyInProgress` if the session is already running a test;
    ///   nothing is emitted and the active run is unaffected
    /// - `RunError::Aborted` if the run was stopped
    pub async fn run(&self, root: &mut Action) -> Result<(), RunError> {
        let guard = self.session.begin_run()?;
        root.reset();

        let id = root.description();
        info!(test = %id, "Test started");
        self.emit(Event::TestStarted {
            action: root.summary(),
        });

        let result = match self.drive(root, Duration::ZERO).await {
            Ok(()) => {
                info!(test = %id, "Test passed");
                self.emit(Event::TestPassed { id: id.clone() });
                Ok(())
            }
            Err(err) => {
                error!(test = %id, error = %err, "Test failed");
                self.emit(Event::TestFailed {
                    id: id.clone(),
                    error: err.to_string(),
                });
                Err(RunError::Aborted { id })
            }
        };

        drop(guard);
        self.emit(Event::TestEnd {
            action: root.summary(),
        });
        result
    }

    /// Compiles `task` with `params` and runs it as its own top-level run.
    ///
    /// Returns the executed tree.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::run`].
    pub async fn run_task(&self, task: &Task, params: Value) -> Result<Action, RunError> {
        let mut root = task.compile(params);
        self.run(&mut root).await?;
        Ok(root)
    }

    /// Runs one action behind the pause gate.
    ///
    /// Re-enters the action for as long as it ends up `PAUSED`, i.e. until
    /// the operator skips it, stops the run or it succeeds.
    async fn drive(&self, action: &mut Action, pace: Duration) -> Result<(), ActionError> {
        if !pace.is_zero() {
            self.clock.sleep(pace).await;
        }

        loop {
            match self.session.checkpoint(action).await {
                Resume::Continue => {}
                Resume::Retry => {
                    action.reset_tries();
                    self.notify(action);
                }
                Resume::Skip => {
                    info!(action = %action.description(), "Action skipped");
                    action.mark_skipped();
                    self.notify(action);
                    return Ok(());
                }
                Resume::Stop => {
                    // An action that never started stays WAITING.
                    if action.status == ActionStatus::Paused {
                        action.mark_stopped();
                        self.notify(action);
                    }
                    return Err(ActionError::Aborted);
                }
            }

            self.execute(action).await?;
            if action.status != ActionStatus::Paused {
                return Ok(());
            }
        }
    }

    /// Executes an action body once and records the outcome on it.
    ///
    /// The environment is captured before the body runs and again after it,
    /// whatever the outcome, and a notification is emitted on both sides.
    #[async_recursion]
    async fn execute(&self, action: &mut Action) -> Result<(), ActionError> {
        action.status = ActionStatus::Running;
        action.error = None;
        action.context = ActionContext {
            before_snapshot: self.env.snapshot().await,
            before_values: self.env.input_values().await,
            url: self.env.current_url().await,
            start_timestamp: Some(Utc::now()),
            ..ActionContext::default()
        };
        self.notify(action);
        debug!(action = %action.description(), "Action");

        let outcome = if action.is_leaf() {
            self.execute_leaf(action).await
        } else {
            self.execute_composite(action).await
        };

        let result = match outcome {
            Ok(Completion::Done) => {
                action.status = ActionStatus::Success;
                if action.is_leaf() && self.session.mode() == RunMode::StepByStep {
                    self.session.pause();
                }
                Ok(())
            }
            Ok(Completion::Skipped) => {
                info!(action = %action.description(), "Action skipped");
                action.status = ActionStatus::Skipped;
                Ok(())
            }
            Err(err) if !err.is_recoverable() => {
                action.status = ActionStatus::Stopped;
                action.error = Some(err.to_string());
                Err(err)
            }
            Err(err) => {
                warn!(action = %action.description(), error = %err, "Action failed, pausing");
                action.status = ActionStatus::Paused;
                action.error = Some(err.to_string());
                self.session.pause();
                Ok(())
            }
        };

        action.context.after_snapshot = self.env.snapshot().await;
        action.context.after_values = self.env.input_values().await;
        action.context.end_timestamp = Some(Utc::now());
        self.notify(action);

        result
    }

    /// Runs the remaining children, then passes the pause gate once more so
    /// that a pause or stop raised by the last child is honoured before the
    /// composite completes.
    async fn execute_composite(&self, action: &mut Action) -> Result<Completion, ActionError> {
        {
            let ActionKind::Composite(composite) = &mut action.kind else {
                return Ok(Completion::Done);
            };

            while composite.index < composite.steps.len() {
                let pace = self.session.step_delay();
                self.drive(&mut composite.steps[composite.index], pace).await?;
                composite.index += 1;
            }
        }

        match self.session.checkpoint(action).await {
            Resume::Stop => Err(ActionError::Aborted),
            Resume::Continue | Resume::Retry | Resume::Skip => Ok(Completion::Done),
        }
    }

    async fn execute_leaf(&self, action: &mut Action) -> Result<Completion, ActionError> {
        let ActionKind::Leaf(leaf) = &action.kind else {
            return Ok(Completion::Done);
        };
        let effect = leaf.effect.clone();
        let element = leaf.element.clone();

        let target = match (&element, self.lookup_options(effect.lookup())) {
            (Some(descriptor), Some(options)) => {
                let mut probe = LeafProbe {
                    engine: self,
                    action,
                };
                match self.locator.locate(descriptor, options, &mut probe).await? {
                    Located::Found(info) => Some(info),
                    Located::Absent => None,
                    Located::Skipped => return Ok(Completion::Skipped),
                }
            }
            _ => None,
        };

        let name = element.as_ref().map(ElementDescriptor::display_name);
        let ctx = EffectContext {
            env: self.env.as_ref(),
            session: &self.session,
            clock: self.clock.as_ref(),
            events: &self.events,
            element: name.as_deref(),
        };
        effect.apply(&ctx, target.as_ref()).await?;
        Ok(Completion::Done)
    }

    fn lookup_options(&self, lookup: Lookup) -> Option<LocateOptions> {
        match lookup {
            Lookup::None => None,
            Lookup::Present => Some(self.config.presence()),
            Lookup::Absent => Some(self.config.absence(self.config.absent_max_tries)),
            Lookup::Removed => Some(self.config.absence(self.config.max_tries)),
        }
    }

    fn notify(&self, action: &Action) {
        self.emit(Event::ActionUpdate {
            action: action.summary(),
        });
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

/// Reports lookup progress on the leaf and honours commands given while
/// the lookup is in flight.
struct LeafProbe<'a> {
    engine: &'a Engine,
    action: &'a mut Action,
}

#[async_trait]
impl<'a> LocateProbe for LeafProbe<'a> {
    async fn before_attempt(&mut self, attempt: u32) -> Result<ProbeDirective, ActionError> {
        match self.engine.session.checkpoint(self.action).await {
            Resume::Continue => {
                self.action.set_tries(attempt);
                self.engine.notify(self.action);
                Ok(ProbeDirective::Proceed)
            }
            Resume::Retry => {
                self.action.reset_tries();
                self.engine.notify(self.action);
                Ok(ProbeDirective::Restart)
            }
            Resume::Skip => Ok(ProbeDirective::Skip),
            Resume::Stop => Err(ActionError::Aborted),
        }
    }
}
