//! Test fixtures: documents, a deterministic clock and an engine harness.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tm_core::actions::Action;
use tm_core::clock::Clock;
use tm_core::config::models::EngineConfig;
use tm_core::engine::Engine;
use tm_core::environment::{DocumentFixture, MemoryDocument, NodeFixture};
use tm_core::error::RunError;
use tm_core::session::RunSession;
use tm_protocol::ipc::Event;
use tm_protocol::run_models::TestSpeed;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type SleepHook = Box<dyn FnMut(usize) + Send>;

/// Clock that records requested sleeps instead of waiting.
///
/// Each sleep yields once so spawned runs and the test body interleave.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
    hook: Mutex<Option<SleepHook>>,
}

#[allow(dead_code)]
impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Calls `hook` with the sleep count after every recorded sleep.
    pub fn on_sleep(&self, hook: impl FnMut(usize) + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some(hook) = self.hook.lock().as_mut() {
            hook(count);
        }
        tokio::task::yield_now().await;
    }
}

/// Lookup settings used by every harness: 10ms delay, 3 tries, 2 absent tries.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        locate_delay: Duration::from_millis(10),
        max_tries: 3,
        absent_max_tries: 2,
    }
}

/// An engine wired to an in-memory document and a recording clock.
pub struct Harness {
    pub doc: Arc<MemoryDocument>,
    pub session: Arc<RunSession>,
    pub clock: Arc<RecordingClock>,
    pub engine: Engine,
    pub events: mpsc::UnboundedReceiver<Event>,
}

#[allow(dead_code)]
impl Harness {
    /// Events emitted so far, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Runs `root` on a spawned task and hands the tree back once the run ends.
    pub fn spawn_run(&self, mut root: Action) -> JoinHandle<(Result<(), RunError>, Action)> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = engine.run(&mut root).await;
            (result, root)
        })
    }

    /// Waits until a manual step is waiting for the operator.
    pub async fn wait_for_decision(&self) {
        self.session.decision_requested().await;
    }
}

/// Harness over a document made of `nodes`, with no delay between steps.
pub fn harness(nodes: Vec<NodeFixture>) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    let doc = Arc::new(MemoryDocument::new(DocumentFixture {
        url: "https://app.test/login".to_string(),
        nodes,
    }));
    let session = Arc::new(RunSession::new(tx.clone(), TestSpeed::Fast));
    session.set_step_delay(Duration::ZERO);
    let clock = Arc::new(RecordingClock::default());
    let engine = Engine::new(doc.clone(), session.clone(), clock.clone(), tx, test_config());

    Harness {
        doc,
        session,
        clock,
        engine,
        events,
    }
}

/// A login form: `#login` wrapping a user field, a password field and a
/// submit button, plus a status banner outside the form.
#[allow(dead_code)]
pub fn login_page() -> Vec<NodeFixture> {
    vec![
        NodeFixture::new("form")
            .with_id("login")
            .with_child(NodeFixture::new("label").with_class("field").with_child(NodeFixture::new("input").with_id("user")))
            .with_child(NodeFixture::new("input").with_id("password"))
            .with_child(NodeFixture::new("button").with_id("submit").with_text("Sign in")),
        NodeFixture::new("div").with_class("banner").with_text("Welcome back"),
    ]
}
