//! Assertion helpers over emitted events.

use tm_protocol::action_models::{ActionStatus, ActionSummary};
use tm_protocol::ipc::Event;
use uuid::Uuid;

/// `ActionUpdate` payloads for the action `id`, in emission order.
pub fn updates_for(events: &[Event], id: Uuid) -> Vec<ActionSummary> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::ActionUpdate { action } if action.id == id => Some(action.clone()),
            _ => None,
        })
        .collect()
}

/// Statuses reported for the action `id`, in emission order.
#[allow(dead_code)]
pub fn statuses_for(events: &[Event], id: Uuid) -> Vec<ActionStatus> {
    updates_for(events, id).into_iter().map(|a| a.status).collect()
}

/// One-line rendering of an event, for comparing whole sequences.
#[allow(dead_code)]
pub fn render(event: &Event) -> String {
    match event {
        Event::ActionUpdate { action } => {
            format!("update {} {:?}", action.description, action.status)
        }
        Event::TestStarted { action } => format!("started {}", action.description),
        Event::TestPassed { id } => format!("passed {id}"),
        Event::TestFailed { id, error } => format!("failed {id}: {error}"),
        Event::TestEnd { action } => format!("end {} {:?}", action.description, action.status),
        Event::SaveValue {
            memory_slot_name,
            value,
        } => format!("save {memory_slot_name}={value}"),
        other => format!("{other:?}"),
    }
}

/// Assert that the events form a complete run: `TestStarted` first, then
/// `TestPassed` or `TestFailed`, and `TestEnd` last.
#[allow(dead_code)]
pub fn assert_run_sequence(events: &[Event]) {
    assert!(
        matches!(events.first(), Some(Event::TestStarted { .. })),
        "First event should be TestStarted, got: {:?}",
        events.first()
    );
    assert!(
        matches!(events.last(), Some(Event::TestEnd { .. })),
        "Last event should be TestEnd, got: {:?}",
        events.last()
    );
    let outcome = events
        .iter()
        .rposition(|e| matches!(e, Event::TestPassed { .. } | Event::TestFailed { .. }));
    assert_eq!(outcome, Some(events.len() - 2), "Outcome must precede TestEnd");
}
