use std::sync::Arc;

use lumen_inspect::{ConsoleEntry, EvalConsole, InspectError};
use lumen_vm::{InstanceKind, MockVmService, Value, VmError};
use pretty_assertions::assert_eq;

use crate::harness::*;

#[tokio::test]
async fn submitting_while_running_only_reports_a_message() {
    let service = Arc::new(MockVmService::new());
    let mut console = EvalConsole::new(session(&service));

    assert_eq!(
        console.submit("1 + 1").await,
        Err(InspectError::NotPaused)
    );
    assert_eq!(
        console.output().get(),
        vec![ConsoleEntry::Message(
            "Cannot evaluate while the application is running.".to_string()
        )]
    );
    assert!(console.history().is_empty());
    assert!(console.tree().is_empty());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn results_are_expandable_tree_roots() {
    let service = Arc::new(MockVmService::new());
    let list = collection("objects/list", InstanceKind::List, 2);
    service.insert_object(list_object(
        list.clone(),
        vec![int("objects/1", 1), int("objects/2", 2)],
    ));
    service.set_evaluation(0, "items", Ok(Value::Instance(list)));
    let mut console = EvalConsole::new(paused_session(&service, frame(None, Vec::new())));

    let id = console.submit("  items ").await.unwrap().unwrap();
    assert_eq!(
        console.output().get(),
        vec![
            ConsoleEntry::Input("items".to_string()),
            ConsoleEntry::Result(id),
        ]
    );
    assert_eq!(
        console.tree().display(id).as_deref(),
        Some("items: Object (length: 2)")
    );

    console.tree_mut().expand(id).await.unwrap();
    assert_eq!(console.tree().node(id).unwrap().children().len(), 2);
}

#[tokio::test]
async fn failures_are_reported_and_still_recorded_in_history() {
    let service = Arc::new(MockVmService::new());
    service.set_evaluation(0, "slow()", Err(VmError::Timeout));
    let mut console = EvalConsole::new(paused_session(&service, frame(None, Vec::new())));

    assert_eq!(
        console.submit("slow()").await,
        Err(InspectError::Vm(VmError::Timeout))
    );
    assert_eq!(
        console.output().get().last(),
        Some(&ConsoleEntry::Error(
            "The application did not respond in time.".to_string()
        ))
    );
    assert_eq!(console.history().len(), 1);
}

#[tokio::test]
async fn history_navigation_follows_submissions() {
    let service = Arc::new(MockVmService::new());
    for expression in ["a", "b", "c"] {
        service.set_evaluation(0, expression, Ok(int("objects/1", 1)));
    }
    let mut console = EvalConsole::new(paused_session(&service, frame(None, Vec::new())));
    for expression in ["a", "b", "c"] {
        console.submit(expression).await.unwrap();
    }

    assert_eq!(console.history_up().as_deref(), Some("b"));
    assert_eq!(console.history_up().as_deref(), Some("a"));
    assert_eq!(console.history_down().as_deref(), Some("b"));

    console.clear();
    assert!(console.output().get().is_empty());
    assert!(console.tree().is_empty());
    assert_eq!(console.history().len(), 3);
}
