//! End-to-end tests: `.tomation/` project → registry → engine.

mod common;

use common::*;
use std::fs;
use tempfile::TempDir;
use tm_core::config::loader::load_config;
use tm_core::environment::memory::Interaction;
use tm_core::environment::{DocumentFixture, ElementHandle};
use tm_core::error::RunError;
use tm_core::registry::TestRegistry;
use tm_core::script::compile_scripts;
use tm_protocol::action_models::ActionStatus;
use tm_protocol::ipc::Event;
use tm_protocol::run_models::TestSpeed;

const LOGIN_TEST: &str = r##"
id: login
elements:
  form:
    query: "#login"
  user:
    query: input
    parent: form
    index: 0
  password:
    query: input
    parent: form
    index: 1
  submit:
    query: button
    parent: form
tasks:
  sign-in:
    - type: { value: "${name}", element: user }
    - type-password: { value: "${secret}", element: password }
    - click: submit
steps:
  - task: { id: sign-in, params: { name: alice, secret: hunter2 } }
  - assert: { element: user, value_is: alice }
  - save-value: { element: user, slot: last-user }
"##;

const DOCUMENT: &str = r##"
{
  "url": "https://app.test/login",
  "nodes": [
    {
      "tag": "form",
      "id": "login",
      "children": [
        { "tag": "input", "id": "user" },
        { "tag": "input", "id": "password" },
        { "tag": "button", "text": "Sign in" }
      ]
    }
  ]
}
"##;

fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();

    fs::create_dir_all(root.join(".tomation/tests"))?;
    fs::write(
        root.join(".tomation/config.toml"),
        "matches = \"app.test\"\nspeed = \"FAST\"\n\n[locator]\ndelay_ms = 10\nmax_tries = 3\n",
    )?;
    fs::write(root.join(".tomation/tests/login.yaml"), LOGIN_TEST)?;
    fs::write(root.join("document.json"), DOCUMENT)?;

    Ok(temp_dir)
}

#[tokio::test]
async fn project_scripts_register_and_run() {
    let project = create_test_project().unwrap();
    let config = load_config(project.path()).await.unwrap();
    assert_eq!(config.global.speed, TestSpeed::Fast);
    assert_eq!(config.engine_config().max_tries, 3);

    let fixture = DocumentFixture::from_path(&project.path().join("document.json")).unwrap();
    assert!(fixture.url.contains(&config.global.matches));

    let mut h = harness(fixture.nodes);
    let registry = TestRegistry::new();
    let (tx, mut registrations) = tokio::sync::mpsc::unbounded_channel();
    for task in compile_scripts(&config.tests).unwrap() {
        registry.register(&task, &tx);
    }
    assert_eq!(registry.ids(), vec!["login".to_string()]);

    let announced = match registrations.try_recv().unwrap() {
        Event::RegisterTest { id, action } => {
            assert_eq!(id, "login");
            action
        }
        other => panic!("unexpected event {other:?}"),
    };

    let tree = registry.run(&h.engine, "login").await.unwrap();

    assert_eq!(tree.id(), announced.id);
    assert_eq!(tree.status(), ActionStatus::Success);
    assert_eq!(tree.steps()[0].steps()[1].description(), "Type a password in password in form");
    assert_eq!(
        h.doc.interactions(),
        vec![
            Interaction::SetValue(ElementHandle("n1".to_string()), "alice".to_string()),
            Interaction::SetValue(ElementHandle("n2".to_string()), "hunter2".to_string()),
            Interaction::Click(ElementHandle("n3".to_string())),
        ]
    );

    let events = h.drain();
    assert_run_sequence(&events);
    assert!(events.contains(&Event::SaveValue {
        memory_slot_name: "last-user".to_string(),
        value: "alice".to_string(),
    }));
    assert!(events.contains(&Event::TestPassed {
        id: "login".to_string()
    }));
}

#[tokio::test]
async fn registered_tests_can_run_again() {
    let project = create_test_project().unwrap();
    let config = load_config(project.path()).await.unwrap();
    let fixture = DocumentFixture::from_path(&project.path().join("document.json")).unwrap();
    let h = harness(fixture.nodes);
    let registry = TestRegistry::new();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    for task in compile_scripts(&config.tests).unwrap() {
        registry.register(&task, &tx);
    }

    let first = registry.run(&h.engine, "login").await.unwrap();
    let second = registry.run(&h.engine, "login").await.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(second.status(), ActionStatus::Success);
    assert_eq!(registry.compiled("login").map(|a| a.status), Some(ActionStatus::Waiting));
}

#[tokio::test]
async fn unknown_test_is_reported() {
    let h = harness(vec![]);
    let registry = TestRegistry::new();

    let err = registry.run(&h.engine, "nope").await.unwrap_err();

    assert_eq!(err, RunError::TaskNotRegistered("nope".to_string()));
    assert_eq!(err.to_string(), "Test with id nope not found.");
    assert!(!h.session.is_running());
}
