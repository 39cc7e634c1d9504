use std::sync::Arc;

use lumen_config::InspectorConfig;
use lumen_inspect::{NodeId, VariableTree, Window};
use lumen_vm::{
    FieldName, InstanceKind, MockVmService, ObjectId, Sentinel, SentinelKind, Value, VmError,
};
use pretty_assertions::assert_eq;

use crate::harness::*;

fn new_tree(service: &Arc<MockVmService>) -> VariableTree {
    VariableTree::new(
        Arc::clone(service) as Arc<dyn lumen_vm::VmService>,
        &InspectorConfig::default(),
    )
}

fn child_lines(tree: &VariableTree, id: NodeId) -> Vec<String> {
    tree.node(id)
        .unwrap()
        .children()
        .iter()
        .filter_map(|child| tree.display(*child))
        .collect()
}

#[tokio::test]
async fn expanding_twice_is_the_same_as_expanding_once() {
    let service = Arc::new(MockVmService::new());
    let list = collection("objects/list", InstanceKind::List, 2);
    service.insert_object(list_object(
        list.clone(),
        vec![int("objects/1", 1), string("objects/s", "two")],
    ));

    let mut tree = new_tree(&service);
    let root = tree.insert_root("items", Value::Instance(list), isolate());
    tree.expand(root).await.unwrap();
    tree.expand(root).await.unwrap();

    assert_eq!(child_lines(&tree, root), vec!["[0]: 1", "[1]: 'two'"]);
    assert_eq!(service.fetch_count(&ObjectId::new("objects/list")), 1);

    tree.collapse(root);
    assert!(!tree.node(root).unwrap().is_expanded());
    tree.expand(root).await.unwrap();
    assert_eq!(tree.node(root).unwrap().children().len(), 2);
    assert_eq!(service.fetch_count(&ObjectId::new("objects/list")), 1);
}

#[tokio::test]
async fn primitive_map_keys_name_their_child() {
    let service = Arc::new(MockVmService::new());
    let map = collection("objects/map", InstanceKind::Map, 1);
    service.insert_object(map_object(
        map.clone(),
        vec![(
            string("objects/key", "Hey"),
            primitive("objects/value", InstanceKind::Double, "12.34"),
        )],
    ));

    let mut tree = new_tree(&service);
    let root = tree.insert_root("map", Value::Instance(map), isolate());
    tree.expand(root).await.unwrap();

    let children = tree.node(root).unwrap().children().to_vec();
    assert_eq!(children.len(), 1);
    let child = tree.node(children[0]).unwrap();
    assert_eq!(child.name(), "Hey");
    assert_eq!(child.display_value(), "12.34");
    assert_eq!(child.isolate(), &isolate());
    assert_eq!(child.parent(), Some(root));
}

#[tokio::test]
async fn non_primitive_map_keys_become_entries() {
    let service = Arc::new(MockVmService::new());
    let lib = library_ref("libraries/app", "package:app/app.dart");
    let point = class_ref("classes/Point", "Point", &lib);
    let key_a = object_of("objects/p1", &point);
    let key_b = object_of("objects/p2", &point);
    let map = collection("objects/map", InstanceKind::Map, 2);
    service.insert_object(map_object(
        map.clone(),
        vec![
            (Value::Instance(key_a.clone()), int("objects/1", 1)),
            (Value::Instance(key_b), int("objects/2", 2)),
        ],
    ));
    service.insert_object(fields_object(
        key_a,
        vec![
            (FieldName::Named("x".to_string()), int("objects/3", 3)),
            (FieldName::Named("y".to_string()), int("objects/4", 4)),
        ],
    ));

    let mut tree = new_tree(&service);
    let root = tree.insert_root("byPoint", Value::Instance(map), isolate());
    tree.expand(root).await.unwrap();

    assert_eq!(child_lines(&tree, root), vec!["[Entry 0]", "[Entry 1]"]);
    let entry = tree.child_named(root, "[Entry 0]").unwrap();
    assert!(tree.node(entry).unwrap().value().is_none());
    assert_eq!(
        child_lines(&tree, entry),
        vec!["[key]: Instance of 'Point'", "[value]: 1"]
    );

    let key = tree.child_named(entry, "[key]").unwrap();
    tree.expand(key).await.unwrap();
    assert_eq!(child_lines(&tree, key), vec!["x: 3", "y: 4"]);
}

#[tokio::test]
async fn records_use_positional_names() {
    let service = Arc::new(MockVmService::new());
    let record = instance_ref("objects/record", InstanceKind::Record);
    service.insert_object(fields_object(
        record.clone(),
        vec![
            (FieldName::Positional(0), int("objects/1", 1)),
            (FieldName::Positional(1), string("objects/s", "b")),
            (FieldName::Named("label".to_string()), string("objects/l", "c")),
        ],
    ));

    let mut tree = new_tree(&service);
    let root = tree.insert_root("r", Value::Instance(record), isolate());
    tree.expand(root).await.unwrap();
    assert_eq!(
        child_lines(&tree, root),
        vec!["$1: 1", "$2: 'b'", "label: 'c'"]
    );
}

#[tokio::test]
async fn long_lists_are_grouped_and_groups_fetch_their_window() {
    let service = Arc::new(MockVmService::new());
    let list = collection("objects/big", InstanceKind::List, 250);
    let elements = (0..250)
        .map(|i| int(&format!("objects/int{i}"), i))
        .collect();
    service.insert_object(list_object(list.clone(), elements));

    let mut tree = new_tree(&service);
    let root = tree.insert_root("big", Value::Instance(list), isolate());
    tree.expand(root).await.unwrap();
    assert_eq!(
        child_lines(&tree, root),
        vec!["[0 - 99]", "[100 - 199]", "[200 - 249]"]
    );
    assert_eq!(service.fetch_count(&ObjectId::new("objects/big")), 0);

    let last = tree.child_named(root, "[200 - 249]").unwrap();
    assert_eq!(
        tree.node(last).unwrap().window(),
        Some(Window {
            offset: 200,
            count: 50
        })
    );
    tree.expand(last).await.unwrap();
    let lines = child_lines(&tree, last);
    assert_eq!(lines.len(), 50);
    assert_eq!(lines[0], "[200]: 200");
    assert_eq!(lines[49], "[249]: 249");
}

#[tokio::test]
async fn failed_fetch_becomes_an_error_child_and_refresh_retries() {
    let service = Arc::new(MockVmService::new());
    let list = collection("objects/list", InstanceKind::List, 1);
    service.fail_object(ObjectId::new("objects/list"), VmError::Timeout);

    let mut tree = new_tree(&service);
    let root = tree.insert_root("items", Value::Instance(list.clone()), isolate());
    tree.expand(root).await.unwrap();

    let children = tree.node(root).unwrap().children().to_vec();
    assert_eq!(children.len(), 1);
    assert!(tree.node(children[0]).unwrap().is_error());

    let healthy = Arc::new(MockVmService::new());
    healthy.insert_object(list_object(list.clone(), vec![int("objects/1", 1)]));
    let mut tree = new_tree(&healthy);
    let root = tree.insert_root("items", Value::Instance(list), isolate());
    tree.expand(root).await.unwrap();
    tree.refresh(root);
    assert!(!tree.node(root).unwrap().is_populated());
    tree.expand(root).await.unwrap();
    assert_eq!(child_lines(&tree, root), vec!["[0]: 1"]);
    assert_eq!(healthy.fetch_count(&ObjectId::new("objects/list")), 2);
}

#[tokio::test]
async fn leaves_expand_to_nothing() {
    let service = Arc::new(MockVmService::new());
    let mut tree = new_tree(&service);
    let number = tree.insert_root("n", int("objects/1", 1), isolate());
    let collected = tree.insert_root(
        "gone",
        Value::Sentinel(Sentinel {
            kind: SentinelKind::Collected,
            value_as_string: "<collected>".to_string(),
        }),
        isolate(),
    );

    tree.expand(number).await.unwrap();
    tree.expand(collected).await.unwrap();

    assert!(tree.node(number).unwrap().children().is_empty());
    assert!(tree.node(number).unwrap().is_expanded());
    assert_eq!(tree.display(collected).as_deref(), Some("gone: <collected>"));
    assert!(service.calls().is_empty());
}
