//! Run control shared by the engine and the operator.
//!
//! A [`RunSession`] holds the playback status, the run mode, the step delay
//! and the single pending continuation of a suspended run. The engine
//! reaches a pause gate through [`RunSession::checkpoint`]; while playback
//! is paused the gate parks a oneshot sender in the session and waits on
//! the receiver. Operator commands (`continue_run`, `next_step`,
//! `retry_action`, `skip_action`, `stop`) change the playback state and
//! resolve that sender, which is the only way a suspended run moves on.
//!
//! Manual steps use a second slot for the operator's accept/reject
//! decision.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tm_protocol::action_models::ActionSummary;
use tm_protocol::ipc::{Command, Event};
use tm_protocol::run_models::{PlaybackStatus, RunMode, TestSpeed};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions::Action;
use crate::error::RunError;

/// How a suspended action should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Re-enter the action.
    Continue,

    /// Reset the attempt counter, then re-enter the action.
    Retry,

    /// Mark the action skipped and move on.
    Skip,

    /// Abort the run.
    Stop,
}

/// Operator answer to a manual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

struct Continuation {
    action: ActionSummary,
    resume: oneshot::Sender<Resume>,
}

struct SessionState {
    playback: PlaybackStatus,
    mode: RunMode,
    speed: TestSpeed,
    step_delay: Duration,
    pending: Option<Continuation>,
    decision: Option<oneshot::Sender<Decision>>,
}

/// Playback state and pending continuation of one engine host.
pub struct RunSession {
    id: Uuid,
    state: Mutex<SessionState>,
    running: AtomicBool,
    events: UnboundedSender<Event>,
    suspended: watch::Sender<Option<ActionSummary>>,
    awaiting_decision: watch::Sender<bool>,
}

/// Marks a run as active until dropped.
#[must_use = "the run is released as soon as the guard is dropped"]
pub struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl RunSession {
    pub fn new(events: UnboundedSender<Event>, speed: TestSpeed) -> Self {
        let (suspended, _) = watch::channel(None);
        let (awaiting_decision, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState {
                playback: PlaybackStatus::Stopped,
                mode: RunMode::Normal,
                speed,
                step_delay: speed.step_delay(),
                pending: None,
                decision: None,
            }),
            running: AtomicBool::new(false),
            events,
            suspended,
            awaiting_decision,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `SessionInit` event announcing this session to a controller.
    pub fn init_event(&self) -> Event {
        Event::SessionInit {
            speed: self.state.lock().speed,
            session_id: self.id,
        }
    }

    pub fn playback(&self) -> PlaybackStatus {
        self.state.lock().playback
    }

    pub fn mode(&self) -> RunMode {
        self.state.lock().mode
    }

    pub fn speed(&self) -> TestSpeed {
        self.state.lock().speed
    }

    /// Delay awaited before every child of a composite.
    pub fn step_delay(&self) -> Duration {
        self.state.lock().step_delay
    }

    pub fn set_speed(&self, speed: TestSpeed) {
        let mut state = self.state.lock();
        state.speed = speed;
        state.step_delay = speed.step_delay();
    }

    /// Overrides the step delay without changing the reported speed.
    pub fn set_step_delay(&self, delay: Duration) {
        self.state.lock().step_delay = delay;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the session for a run.
    ///
    /// # Errors
    ///
    /// Returns `RunError::RunAlreadyInProgress` while another guard is alive.
    pub fn begin_run(&self) -> Result<RunGuard<'_>, RunError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RunError::RunAlreadyInProgress)?;

        let mut state = self.state.lock();
        state.playback = PlaybackStatus::Playing;
        state.mode = RunMode::Normal;

        Ok(RunGuard {
            running: &self.running,
        })
    }

    /// The pause gate.
    ///
    /// Returns immediately while playing or stopped. While paused, records
    /// `action` as the pending continuation and waits for an operator
    /// command. A continuation that is dropped without an answer counts as
    /// a stop.
    pub async fn checkpoint(&self, action: &Action) -> Resume {
        let receiver = {
            let mut state = self.state.lock();
            match state.playback {
                PlaybackStatus::Playing => return Resume::Continue,
                PlaybackStatus::Stopped => return Resume::Stop,
                PlaybackStatus::Paused => {}
            }

            let (resume, receiver) = oneshot::channel();
            let summary = action.summary();
            state.pending = Some(Continuation {
                action: summary.clone(),
                resume,
            });
            self.suspended.send_replace(Some(summary));
            receiver
        };

        info!(action = %action.description(), "Run suspended");
        let resume = receiver.await.unwrap_or(Resume::Stop);
        debug!(action = %action.description(), ?resume, "Run resumed");
        resume
    }

    /// The action currently waiting at the pause gate.
    pub fn pending_action(&self) -> Option<ActionSummary> {
        self.state
            .lock()
            .pending
            .as_ref()
            .map(|pending| pending.action.clone())
    }

    /// Waits until a run is suspended at the pause gate and returns the
    /// waiting action.
    pub async fn suspended(&self) -> Option<ActionSummary> {
        let mut receiver = self.suspended.subscribe();
        loop {
            if let Some(action) = receiver.borrow_and_update().clone() {
                return Some(action);
            }
            if receiver.changed().await.is_err() {
                return None;
            }
        }
    }

    fn resolve(&self, state: &mut SessionState, resume: Resume) -> Option<ActionSummary> {
        let pending = state.pending.take()?;
        self.suspended.send_replace(None);
        let _ = pending.resume.send(resume);
        Some(pending.action)
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Pauses at the next pause gate. Resolves nothing.
    pub fn pause(&self) {
        info!("Pause Test");
        self.state.lock().playback = PlaybackStatus::Paused;
        self.emit(Event::TestPause);
    }

    /// Resumes in normal mode. Returns the action that was waiting, if any.
    pub fn continue_run(&self) -> Option<ActionSummary> {
        info!("Continue Test");
        let resumed = {
            let mut state = self.state.lock();
            state.playback = PlaybackStatus::Playing;
            state.mode = RunMode::Normal;
            self.resolve(&mut state, Resume::Continue)
        };
        self.emit(Event::TestPlay);
        resumed
    }

    /// Resumes in step-by-step mode: the run pauses again after the next leaf.
    pub fn next_step(&self) -> Option<ActionSummary> {
        info!("Continue Test to Next Step");
        let resumed = {
            let mut state = self.state.lock();
            state.playback = PlaybackStatus::Playing;
            state.mode = RunMode::StepByStep;
            self.resolve(&mut state, Resume::Continue)
        };
        self.emit(Event::TestPlay);
        resumed
    }

    /// Resumes and re-attempts the waiting action with a fresh attempt counter.
    pub fn retry_action(&self) -> Option<ActionSummary> {
        info!("Retry current step");
        let resumed = {
            let mut state = self.state.lock();
            state.playback = PlaybackStatus::Playing;
            self.resolve(&mut state, Resume::Retry)
        };
        self.emit(Event::TestPlay);
        resumed
    }

    /// Resumes and skips the waiting action.
    pub fn skip_action(&self) -> Option<ActionSummary> {
        info!("Skip current step");
        let resumed = {
            let mut state = self.state.lock();
            state.playback = PlaybackStatus::Playing;
            self.resolve(&mut state, Resume::Skip)
        };
        self.emit(Event::TestPlay);
        resumed
    }

    /// Aborts the run at its next pause gate, immediately if it is suspended.
    pub fn stop(&self) -> Option<ActionSummary> {
        info!("Stop Test");
        let resumed = {
            let mut state = self.state.lock();
            state.playback = PlaybackStatus::Stopped;
            state.decision = None;
            self.awaiting_decision.send_replace(false);
            self.resolve(&mut state, Resume::Stop)
        };
        self.emit(Event::TestStop);
        resumed
    }

    /// Waits for the operator to accept or reject a manual step.
    ///
    /// Returns `None` when the run is stopped first.
    pub async fn await_decision(&self) -> Option<Decision> {
        let receiver = {
            let mut state = self.state.lock();
            if state.playback == PlaybackStatus::Stopped {
                return None;
            }
            let (sender, receiver) = oneshot::channel();
            state.decision = Some(sender);
            self.awaiting_decision.send_replace(true);
            receiver
        };
        receiver.await.ok()
    }

    /// Waits until a manual step is waiting for the operator.
    pub async fn decision_requested(&self) {
        let mut receiver = self.awaiting_decision.subscribe();
        let _ = receiver.wait_for(|awaiting| *awaiting).await;
    }

    pub fn is_awaiting_decision(&self) -> bool {
        self.state.lock().decision.is_some()
    }

    /// Accepts the pending manual step. Returns false if none was waiting.
    pub fn user_accept(&self) -> bool {
        self.decide(Decision::Accept, Event::UserAccept)
    }

    /// Rejects the pending manual step. Returns false if none was waiting.
    pub fn user_reject(&self) -> bool {
        self.decide(Decision::Reject, Event::UserReject)
    }

    fn decide(&self, decision: Decision, event: Event) -> bool {
        let sender = {
            let mut state = self.state.lock();
            self.awaiting_decision.send_replace(false);
            state.decision.take()
        };
        let delivered = sender.is_some_and(|sender| sender.send(decision).is_ok());
        if delivered {
            info!(?decision, "Manual step decided");
            self.emit(event);
        }
        delivered
    }

    /// Applies a playback or decision command.
    ///
    /// Returns false for commands that are not handled by the session
    /// (`RunTest`, `ReloadTests`).
    pub fn apply(&self, command: &Command) -> bool {
        match command {
            Command::Pause => self.pause(),
            Command::Stop => {
                self.stop();
            }
            Command::Continue => {
                self.continue_run();
            }
            Command::NextStep => {
                self.next_step();
            }
            Command::RetryAction => {
                self.retry_action();
            }
            Command::SkipAction => {
                self.skip_action();
            }
            Command::UserAccept => {
                self.user_accept();
            }
            Command::UserReject => {
                self.user_reject();
            }
            Command::RunTest { .. } | Command::ReloadTests => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::effects::Wait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn session() -> (Arc<RunSession>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RunSession::new(tx, TestSpeed::Fast)), rx)
    }

    #[test]
    fn begin_run_is_exclusive() {
        let (session, _rx) = session();

        let guard = session.begin_run().expect("first run starts");
        assert!(session.is_running());
        assert_eq!(session.playback(), PlaybackStatus::Playing);
        assert_eq!(session.begin_run().err(), Some(RunError::RunAlreadyInProgress));

        drop(guard);
        assert!(!session.is_running());
        assert!(session.begin_run().is_ok());
    }

    #[tokio::test]
    async fn checkpoint_passes_while_playing() {
        let (session, _rx) = session();
        let _guard = session.begin_run().unwrap();
        let action = Action::leaf(Wait { millis: 1 });

        assert_eq!(session.checkpoint(&action).await, Resume::Continue);
        assert!(session.pending_action().is_none());
    }

    #[tokio::test]
    async fn checkpoint_reports_stop() {
        let (session, _rx) = session();
        session.stop();

        let action = Action::leaf(Wait { millis: 1 });
        assert_eq!(session.checkpoint(&action).await, Resume::Stop);
    }

    #[tokio::test]
    async fn paused_checkpoint_waits_for_command() {
        let (session, mut rx) = session();
        let _guard = session.begin_run().unwrap();
        session.pause();
        assert_eq!(rx.recv().await, Some(Event::TestPause));

        let action = Action::leaf(Wait { millis: 1 });
        let id = action.id();
        let gate = {
            let session = session.clone();
            tokio::spawn(async move { session.checkpoint(&action).await })
        };

        let waiting = session.suspended().await.expect("run suspends");
        assert_eq!(waiting.id, id);
        assert_eq!(session.pending_action().map(|a| a.id), Some(id));

        let resumed = session.skip_action();
        assert_eq!(resumed.map(|a| a.id), Some(id));
        assert_eq!(gate.await.unwrap(), Resume::Skip);
        assert!(session.pending_action().is_none());
        assert_eq!(session.playback(), PlaybackStatus::Playing);
        assert_eq!(rx.recv().await, Some(Event::TestPlay));
    }

    #[tokio::test]
    async fn commands_without_pending_continuation_only_change_state() {
        let (session, _rx) = session();

        assert!(session.next_step().is_none());
        assert_eq!(session.mode(), RunMode::StepByStep);
        assert_eq!(session.playback(), PlaybackStatus::Playing);

        assert!(session.continue_run().is_none());
        assert_eq!(session.mode(), RunMode::Normal);

        assert!(session.stop().is_none());
        assert_eq!(session.playback(), PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn decisions_reach_the_waiting_step() {
        let (session, _rx) = session();
        let _guard = session.begin_run().unwrap();
        assert!(!session.user_accept());

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.await_decision().await })
        };
        session.decision_requested().await;

        assert!(session.user_reject());
        assert_eq!(waiter.await.unwrap(), Some(Decision::Reject));
    }

    #[tokio::test]
    async fn stop_cancels_pending_decision() {
        let (session, _rx) = session();
        let _guard = session.begin_run().unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.await_decision().await })
        };
        session.decision_requested().await;

        session.stop();
        assert_eq!(waiter.await.unwrap(), None);
        assert!(!session.is_awaiting_decision());

        let requested = tokio::time::timeout(Duration::from_millis(10), session.decision_requested()).await;
        assert!(requested.is_err(), "no decision is pending after a stop");
    }

    #[test]
    fn speed_sets_step_delay() {
        let (session, _rx) = session();
        assert_eq!(session.step_delay(), Duration::from_millis(200));

        session.set_speed(TestSpeed::Slow);
        assert_eq!(session.step_delay(), Duration::from_millis(2000));

        session.set_step_delay(Duration::ZERO);
        assert_eq!(session.speed(), TestSpeed::Slow);
        assert_eq!(session.step_delay(), Duration::ZERO);
    }

    #[test]
    fn init_event_carries_session_id() {
        let (session, _rx) = session();

        match session.init_event() {
            Event::SessionInit { speed, session_id } => {
                assert_eq!(speed, TestSpeed::Fast);
                assert_eq!(session_id, session.id());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
