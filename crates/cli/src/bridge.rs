//! Line-oriented bridge between a controller and the engine.
//!
//! The controller writes one `Command` JSON object per line and reads one
//! `Event` JSON object per line back. Runs execute on their own tasks so
//! control commands keep flowing while a test waits at the pause gate.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_core::clock::TokioClock;
use tm_core::config::loader::load_config;
use tm_core::config::models::AppConfig;
use tm_core::engine::Engine;
use tm_core::environment::{DocumentFixture, MemoryDocument};
use tm_core::error::RunError;
use tm_core::registry::TestRegistry;
use tm_core::script::compile_scripts;
use tm_core::session::RunSession;
use tm_protocol::ipc::{Command, Event};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Bridge {
    root: PathBuf,
    config: AppConfig,
    session: Arc<RunSession>,
    engine: Engine,
    registry: Arc<TestRegistry>,
    events_tx: UnboundedSender<Event>,
    events: UnboundedReceiver<Event>,
    runs: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Wires an engine to the document described by `document`.
    ///
    /// # Errors
    ///
    /// Fails when the fixture cannot be read or when its URL does not
    /// contain the configured `matches` pattern.
    pub fn open(root: &Path, config: AppConfig, document: &Path) -> Result<Self> {
        let fixture = DocumentFixture::from_path(document)?;
        if !fixture.url.contains(&config.global.matches) {
            bail!(
                "Document {} does not match '{}'",
                fixture.url,
                config.global.matches
            );
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let session = Arc::new(RunSession::new(events_tx.clone(), config.global.speed));
        let engine = Engine::new(
            Arc::new(MemoryDocument::new(fixture)),
            session.clone(),
            Arc::new(TokioClock),
            events_tx.clone(),
            config.engine_config(),
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            session,
            engine,
            registry: Arc::new(TestRegistry::new()),
            events_tx,
            events,
            runs: Vec::new(),
        })
    }

    /// Serves commands from `input` until it is closed, writing events to
    /// `output`.
    ///
    /// On end of input, active runs are awaited; a run left waiting for the
    /// operator is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial scripts do not compile or if reading
    /// or writing a line fails.
    pub async fn serve<R, W>(mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let _ = self.events_tx.send(self.session.init_event());
        self.register_all()?;

        let mut lines = input.lines();
        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => write_event(output, &event).await?,

                line = lines.next_line() => match line? {
                    Some(line) => self.handle_line(&line).await,
                    None => break,
                },
            }
        }

        info!("Input closed");
        self.finish().await;
        while let Ok(event) = self.events.try_recv() {
            write_event(output, &event).await?;
        }
        output.flush().await?;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<Command>(line) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => warn!(error = %e, "Ignoring malformed command"),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::RunTest { test_id } => self.start_run(test_id),
            Command::ReloadTests => {
                if let Err(e) = self.reload().await {
                    error!(error = %e, "Reload failed");
                }
            }
            other => {
                self.session.apply(&other);
            }
        }
    }

    fn start_run(&mut self, test_id: String) {
        self.runs.retain(|run| !run.is_finished());

        if !self.registry.contains(&test_id) {
            warn!("{}", RunError::TaskNotRegistered(test_id));
            return;
        }

        let registry = self.registry.clone();
        let engine = self.engine.clone();
        self.runs.push(tokio::spawn(async move {
            match registry.run(&engine, &test_id).await {
                Ok(tree) => info!(test = %test_id, status = ?tree.status(), "Run finished"),
                Err(e) => warn!(test = %test_id, error = %e, "Run ended"),
            }
        }));
    }

    async fn reload(&mut self) -> Result<()> {
        self.config = load_config(&self.root).await?;
        self.session.set_speed(self.config.global.speed);
        self.register_all()
    }

    fn register_all(&self) -> Result<()> {
        let tasks = compile_scripts(&self.config.tests)?;
        self.registry.clear();
        for task in &tasks {
            self.registry.register(task, &self.events_tx);
        }
        info!(count = tasks.len(), "Tests registered");
        Ok(())
    }

    async fn finish(&mut self) {
        for mut run in self.runs.drain(..) {
            tokio::select! {
                _ = &mut run => {}
                _ = waiting_for_operator(&self.session) => {
                    info!("Stopping run left waiting for the operator");
                    self.session.stop();
                    let _ = run.await;
                }
            }
        }
    }
}

/// Resolves once a run is suspended or waits on a manual step.
async fn waiting_for_operator(session: &RunSession) {
    tokio::select! {
        _ = session.suspended() => {}
        () = session.decision_requested() => {}
    }
}

async fn write_event<W: AsyncWrite + Unpin>(output: &mut W, event: &Event) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
