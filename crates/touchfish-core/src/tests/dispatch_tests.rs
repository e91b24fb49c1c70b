//! Tests for action dispatch

use super::fixtures::{Call, ECHO_LIST, RecipeDir, Recorder};
use crate::dispatch::{ActionDispatcher, ActionError};
use crate::navigation::{NavigationStack, NavigationState};
use std::sync::Arc;
use touchfish_types::{ActionKind, ResultItem};

struct Harness {
    _dir: RecipeDir,
    navigation: Arc<NavigationStack>,
    recorder: Arc<Recorder>,
    dispatcher: ActionDispatcher,
}

fn harness(recorder: Arc<Recorder>) -> Harness {
    let dir = RecipeDir::new();
    dir.add_script("r1", ECHO_LIST);
    let navigation = Arc::new(NavigationStack::new(dir.registry()));
    navigation.go_to_recipe(Some("r1")).unwrap();
    let dispatcher = ActionDispatcher::new(
        Arc::clone(&navigation),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
    );
    Harness {
        _dir: dir,
        navigation,
        recorder,
        dispatcher,
    }
}

#[test]
fn test_copy_then_open_in_order() {
    let h = harness(Recorder::new());
    let item = ResultItem::new("hello")
        .with_action(ActionKind::Copy, ["hello"])
        .with_action(ActionKind::Open, ["https://example.com"]);

    let report = h.dispatcher.dispatch(&item, "r1");

    assert!(report.is_clean());
    assert_eq!(report.performed, vec![0, 1]);
    assert_eq!(
        h.recorder.calls(),
        vec![
            Call::Copy("hello".to_string()),
            Call::Open(None, "https://example.com".to_string()),
        ]
    );
}

#[test]
fn test_failed_copy_does_not_stop_open() {
    let h = harness(Recorder::failing_copy());
    let item = ResultItem::new("x")
        .with_action(ActionKind::Copy, ["data"])
        .with_action(ActionKind::Open, ["https://example.com"]);

    let report = h.dispatcher.dispatch(&item, "r1");

    assert_eq!(report.performed, vec![1]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        (0, ActionError::Collaborator { action: ActionKind::Copy, .. })
    ));
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Open(None, "https://example.com".to_string())]
    );
}

#[test]
fn test_missing_parameter_skips_action() {
    let h = harness(Recorder::new());
    let item = ResultItem::new("x")
        .with_action(ActionKind::Copy, Vec::<String>::new())
        .with_action(ActionKind::Hide, Vec::<String>::new());

    let report = h.dispatcher.dispatch(&item, "r1");

    assert!(matches!(
        report.failures[0],
        (0, ActionError::MissingParameter { action: ActionKind::Copy, index: 0 })
    ));
    assert_eq!(h.recorder.calls(), vec![Call::Deactivate]);
}

#[test]
fn test_back_returns_to_idle() {
    let h = harness(Recorder::new());
    let item = ResultItem::new("x").with_action(ActionKind::Back, Vec::<String>::new());

    let report = h.dispatcher.dispatch(&item, "r1");

    assert!(report.is_clean());
    assert_eq!(h.navigation.state(), NavigationState::Idle);
    assert!(h.recorder.calls().is_empty());
}

#[test]
fn test_hide_leaves_navigation_alone() {
    let h = harness(Recorder::new());
    let item = ResultItem::new("x").with_action(ActionKind::Hide, ["ignored"]);

    h.dispatcher.dispatch(&item, "r1");

    assert_eq!(h.recorder.calls(), vec![Call::Deactivate]);
    assert_eq!(h.navigation.active_recipe().as_deref(), Some("r1"));
}

#[test]
fn test_open_uses_configured_browser() {
    let h = harness(Recorder::new());
    h.dispatcher.set_browser(Some("Google Chrome".to_string()));
    let item = ResultItem::new("x").with_action(ActionKind::Open, ["https://a.example", "extra"]);

    h.dispatcher.dispatch(&item, "r1");

    assert_eq!(
        h.recorder.calls(),
        vec![Call::Open(
            Some("Google Chrome".to_string()),
            "https://a.example".to_string()
        )]
    );
}

#[test]
fn test_item_without_actions() {
    let h = harness(Recorder::new());
    let report = h.dispatcher.dispatch(&ResultItem::new("plain"), "r1");

    assert!(report.performed.is_empty());
    assert!(report.is_clean());
}
