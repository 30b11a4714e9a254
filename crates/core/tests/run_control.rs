//! Integration tests for operator control of a running test.
//!
//! These tests verify that pause, continue, next, retry, skip, stop and the
//! manual step decisions reach the engine through the run session.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tm_core::compiler::Task;
use tm_core::environment::NodeFixture;
use tm_core::error::RunError;
use tm_core::locator::ElementDescriptor;
use tm_protocol::action_models::ActionStatus;
use tm_protocol::ipc::{Command, Event};
use tm_protocol::run_models::{PlaybackStatus, RunMode};

fn ghost() -> ElementDescriptor {
    ElementDescriptor::identified_by("ghost").named("Ghost")
}

fn ghost_flow() -> Task {
    let ghost = ghost();
    let banner = ElementDescriptor::query(".banner").named("Banner");
    Task::new("Flow", move |s, _| {
        s.click(&ghost);
        s.assert(&banner).exists();
    })
}

#[tokio::test]
async fn continue_reexecutes_the_failed_action_with_its_counter() {
    let mut h = harness(login_page());
    let root = ghost_flow().compile(Value::Null);
    let ghost_id = root.steps()[0].id();
    let run = h.spawn_run(root);

    let waiting = h.session.suspended().await.unwrap();
    assert_eq!(waiting.tries, Some(2));

    h.doc.insert(None, NodeFixture::new("button").with_id("ghost")).unwrap();
    assert_eq!(h.session.continue_run().map(|a| a.id), Some(ghost_id));
    let (result, root) = run.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(root.steps()[0].status(), ActionStatus::Success);
    assert_eq!(root.steps()[1].status(), ActionStatus::Success);

    let updates = updates_for(&h.drain(), ghost_id);
    let reentry = updates
        .iter()
        .skip_while(|a| a.status != ActionStatus::Paused)
        .find(|a| a.status == ActionStatus::Running)
        .unwrap();
    assert_eq!(reentry.tries, Some(2));
    assert_eq!(reentry.error, None);
    assert_eq!(updates.last().map(|a| a.status), Some(ActionStatus::Success));
}

#[tokio::test]
async fn retry_resets_the_counter_first() {
    let mut h = harness(login_page());
    let root = ghost_flow().compile(Value::Null);
    let ghost_id = root.steps()[0].id();
    let run = h.spawn_run(root);
    h.session.suspended().await.unwrap();

    h.doc.insert(None, NodeFixture::new("button").with_id("ghost")).unwrap();
    h.session.retry_action();
    let (result, _root) = run.await.unwrap();

    assert!(result.is_ok());
    let updates = updates_for(&h.drain(), ghost_id);
    let after_pause: Vec<_> = updates
        .iter()
        .skip_while(|a| a.status != ActionStatus::Paused)
        .skip(1)
        .map(|a| (a.status, a.tries))
        .collect();
    assert_eq!(
        after_pause,
        vec![
            (ActionStatus::Paused, Some(0)),
            (ActionStatus::Running, Some(0)),
            (ActionStatus::Running, Some(0)),
            (ActionStatus::Success, Some(0)),
        ]
    );
    assert_eq!(h.clock.sleeps().len(), 2);
}

#[tokio::test]
async fn retry_while_still_missing_polls_the_full_budget_again() {
    let h = harness(login_page());
    let run = h.spawn_run(ghost_flow().compile(Value::Null));
    h.session.suspended().await.unwrap();

    h.session.retry_action();
    let waiting = h.session.suspended().await.unwrap();

    assert_eq!(waiting.status, ActionStatus::Paused);
    assert_eq!(h.clock.sleeps().len(), 4);

    h.session.stop();
    run.await.unwrap();
}

#[tokio::test]
async fn stop_ends_the_run_and_frees_the_session() {
    let mut h = harness(login_page());
    let run = h.spawn_run(ghost_flow().compile(Value::Null));
    h.session.suspended().await.unwrap();

    h.session.stop();
    let (result, root) = run.await.unwrap();

    assert_eq!(result, Err(RunError::Aborted { id: "Flow".to_string() }));
    assert_eq!(root.status(), ActionStatus::Stopped);
    assert_eq!(root.error(), Some("Test stopped manually"));
    assert_eq!(root.steps()[0].status(), ActionStatus::Stopped);
    assert_eq!(root.steps()[1].status(), ActionStatus::Waiting);
    assert!(!h.session.is_running());

    let events = h.drain();
    assert_run_sequence(&events);
    assert!(events.contains(&Event::TestStop));
    assert!(events.contains(&Event::TestFailed {
        id: "Flow".to_string(),
        error: "Test stopped manually".to_string(),
    }));

    let next = Task::new("Next", |s, _| s.wait(1));
    let tree = h.engine.run_task(&next, Value::Null).await.unwrap();
    assert_eq!(tree.status(), ActionStatus::Success);
}

#[tokio::test]
async fn pause_action_suspends_before_the_next_step() {
    let mut h = harness(login_page());
    let banner = ElementDescriptor::query(".banner").named("Banner");
    let task = Task::new("Paused", move |s, _| {
        s.pause();
        s.assert(&banner).exists();
    });
    let root = task.compile(Value::Null);
    let assert_id = root.steps()[1].id();
    let run = h.spawn_run(root);

    let waiting = h.session.suspended().await.unwrap();
    assert_eq!(waiting.id, assert_id);
    assert_eq!(waiting.status, ActionStatus::Waiting);
    assert_eq!(h.session.playback(), PlaybackStatus::Paused);

    h.session.continue_run();
    let (result, root) = run.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(root.steps()[0].status(), ActionStatus::Success);
    let events = h.drain();
    assert!(events.contains(&Event::TestPause));
    assert!(events.contains(&Event::TestPlay));
}

#[tokio::test]
async fn next_step_pauses_after_every_leaf() {
    let h = harness(login_page());
    let task = Task::new("Steps", |s, _| {
        s.pause();
        s.wait(1);
        s.wait(2);
        s.wait(3);
    });
    let root = task.compile(Value::Null);
    let ids: Vec<_> = root.steps().iter().map(|a| a.id()).collect();
    let run = h.spawn_run(root);

    assert_eq!(h.session.suspended().await.map(|a| a.id), Some(ids[1]));
    h.session.next_step();
    assert_eq!(h.session.mode(), RunMode::StepByStep);

    assert_eq!(h.session.suspended().await.map(|a| a.id), Some(ids[2]));
    assert_eq!(h.clock.sleeps().len(), 1);
    h.session.next_step();

    assert_eq!(h.session.suspended().await.map(|a| a.id), Some(ids[3]));
    h.session.continue_run();

    let (result, root) = run.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(root.cursor(), 4);
    assert_eq!(h.session.mode(), RunMode::Normal);
}

#[tokio::test]
async fn next_step_also_pauses_after_the_last_leaf() {
    let mut h = harness(login_page());
    let task = Task::new("Steps", |s, _| {
        s.pause();
        s.wait(1);
        s.wait(2);
    });
    let root = task.compile(Value::Null);
    let root_id = root.id();
    let ids: Vec<_> = root.steps().iter().map(|a| a.id()).collect();
    let run = h.spawn_run(root);

    assert_eq!(h.session.suspended().await.map(|a| a.id), Some(ids[1]));
    h.session.next_step();
    assert_eq!(h.session.suspended().await.map(|a| a.id), Some(ids[2]));
    h.session.next_step();

    let waiting = h.session.suspended().await.unwrap();
    assert_eq!(waiting.id, root_id);
    assert!(!run.is_finished());
    assert!(h.session.is_running());

    h.session.next_step();
    let (result, root) = run.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(root.status(), ActionStatus::Success);
    assert_eq!(h.session.playback(), PlaybackStatus::Playing);
    assert!(h.drain().contains(&Event::TestPassed {
        id: "Steps".to_string()
    }));
}

#[tokio::test]
async fn stop_during_the_last_leaf_fails_the_run() {
    let mut h = harness(login_page());
    let session = h.session.clone();
    h.clock.on_sleep(move |_| {
        session.stop();
    });
    let task = Task::new("Last", |s, _| s.wait(5));
    let run = h.spawn_run(task.compile(Value::Null));

    let (result, root) = run.await.unwrap();

    assert_eq!(result, Err(RunError::Aborted { id: "Last".to_string() }));
    assert_eq!(root.status(), ActionStatus::Stopped);
    assert_eq!(root.steps()[0].status(), ActionStatus::Success);

    let events = h.drain();
    assert_run_sequence(&events);
    assert!(events.contains(&Event::TestFailed {
        id: "Last".to_string(),
        error: "Test stopped manually".to_string(),
    }));
    assert!(!events.iter().any(|e| matches!(e, Event::TestPassed { .. })));
}

#[tokio::test]
async fn stop_between_children_leaves_the_next_one_waiting() {
    let mut h = harness(login_page());
    let session = h.session.clone();
    h.clock.on_sleep(move |count| {
        if count == 1 {
            session.stop();
        }
    });
    let task = Task::new("Two", |s, _| {
        s.wait(1);
        s.wait(2);
    });
    let root = task.compile(Value::Null);
    let second_id = root.steps()[1].id();

    let (result, root) = h.spawn_run(root).await.unwrap();

    assert!(matches!(result, Err(RunError::Aborted { .. })));
    assert_eq!(root.status(), ActionStatus::Stopped);
    assert_eq!(root.steps()[0].status(), ActionStatus::Success);
    assert_eq!(root.steps()[1].status(), ActionStatus::Waiting);
    assert_eq!(root.steps()[1].error(), None);
    assert!(updates_for(&h.drain(), second_id).is_empty());
}

#[tokio::test]
async fn rejected_manual_step_pauses_and_can_be_accepted_later() {
    let mut h = harness(login_page());
    let task = Task::new("Manual", |s, _| {
        s.manual_task("Solve the captcha");
        s.wait(1);
    });
    let root = task.compile(Value::Null);
    let manual_id = root.steps()[0].id();
    let run = h.spawn_run(root);

    h.wait_for_decision().await;
    assert!(h.session.apply(&Command::UserReject));

    let waiting = h.session.suspended().await.unwrap();
    assert_eq!(waiting.id, manual_id);
    assert_eq!(waiting.error.as_deref(), Some("Manual step 'Solve the captcha' rejected"));

    assert!(h.session.apply(&Command::Continue));
    h.wait_for_decision().await;
    assert!(h.session.apply(&Command::UserAccept));

    let (result, root) = run.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(root.steps()[0].status(), ActionStatus::Success);

    let events = h.drain();
    assert!(events.contains(&Event::UserReject));
    assert!(events.contains(&Event::UserAccept));
}

#[tokio::test]
async fn stop_during_manual_step_aborts() {
    let h = harness(login_page());
    let task = Task::new("Manual", |s, _| s.manual_task("Check"));
    let run = h.spawn_run(task.compile(Value::Null));

    h.wait_for_decision().await;
    h.session.apply(&Command::Stop);

    let (result, root) = run.await.unwrap();
    assert!(matches!(result, Err(RunError::Aborted { .. })));
    assert_eq!(root.steps()[0].status(), ActionStatus::Stopped);
    assert!(!h.session.is_awaiting_decision());
}

#[tokio::test]
async fn run_commands_are_not_session_commands() {
    let h = harness(vec![]);

    assert!(!h.session.apply(&Command::RunTest {
        test_id: "login".to_string()
    }));
    assert!(!h.session.apply(&Command::ReloadTests));
    assert!(h.session.pending_action().is_none());
}
