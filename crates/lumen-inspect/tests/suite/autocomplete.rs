use std::sync::Arc;

use lumen_inspect::{AutocompleteController, EditingParts, PauseState};
use lumen_vm::{
    ClassRef, ErrorRef, FuncOwner, InstanceKind, InstanceRef, LibraryDependency, LibraryRef,
    MockVmService, ObjectId, Value,
};
use pretty_assertions::assert_eq;

use crate::harness::*;

fn parts(line: &str) -> EditingParts {
    EditingParts::from_line(line, line.len())
}

/// `main()` paused in `package:app/app.dart`.
fn app_frame(app: &LibraryRef, vars: Vec<(&str, Value)>) -> PauseState {
    paused_at(frame(
        Some(function("main", FuncOwner::Library(app.clone()), true)),
        vars,
    ))
}

struct PointFixture {
    app: LibraryRef,
    point: ClassRef,
}

/// `Point extends Base`, with `Base` declared in another library.
fn point_fixture(service: &MockVmService) -> PointFixture {
    let app = library_ref("libraries/app", "package:app/app.dart");
    let base_lib = library_ref("libraries/base", "package:base/base.dart");
    let base = class_ref("classes/Base", "Base", &base_lib);
    let point = class_ref("classes/Point", "Point", &app);

    service.insert_object(class_object(ClassDecl {
        reference: &point,
        super_class: Some(&base),
        fields: vec![field("zero", true), field("x", false)],
        functions: vec![
            function("Point", FuncOwner::Class(point.clone()), false),
            function("Point.origin", FuncOwner::Class(point.clone()), false),
            function("distanceTo", FuncOwner::Class(point.clone()), false),
            function("parse", FuncOwner::Class(point.clone()), true),
            function("_scale", FuncOwner::Class(point.clone()), false),
        ],
    }));
    service.insert_object(class_object(ClassDecl {
        reference: &base,
        super_class: None,
        fields: vec![field("id", false)],
        functions: vec![
            function("==", FuncOwner::Class(base.clone()), false),
            function("[]", FuncOwner::Class(base.clone()), false),
            function("unary-", FuncOwner::Class(base.clone()), false),
            function("toString", FuncOwner::Class(base.clone()), false),
            function("_internal", FuncOwner::Class(base.clone()), false),
            function("name=", FuncOwner::Class(base.clone()), false),
            function("x", FuncOwner::Class(base.clone()), false),
        ],
    }));

    service.set_evaluation(0, "p", Ok(Value::Instance(object_of("objects/p", &point))));
    service.set_evaluation(
        0,
        "Point",
        Ok(Value::Instance(InstanceRef {
            type_class: Some(point.clone()),
            ..instance_ref("objects/type", InstanceKind::Type)
        })),
    );

    PointFixture { app, point }
}

#[tokio::test]
async fn bare_identifiers_complete_from_frame_variables() {
    let service = Arc::new(MockVmService::new());
    let session = session(&service);
    let resolver = session.resolver();
    let pause = paused_at(frame(
        None,
        vec![
            ("foo", int("objects/1", 1)),
            ("foobar", int("objects/2", 2)),
            ("bar", int("objects/3", 3)),
            ("baz", int("objects/4", 4)),
        ],
    ));

    assert_eq!(
        resolver.resolve(&parts("foo"), Some(&pause)).await,
        vec!["foo", "foobar"]
    );
    assert_eq!(
        resolver.resolve(&parts("1 + b"), Some(&pause)).await,
        vec!["bar", "baz"]
    );
    assert!(resolver.resolve(&parts("q"), Some(&pause)).await.is_empty());
}

#[tokio::test]
async fn nothing_is_offered_while_running() {
    let service = Arc::new(MockVmService::new());
    let session = session(&service);
    assert!(session.resolver().resolve(&parts("f"), None).await.is_empty());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn instance_members_walk_the_superclass_chain() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, Vec::new());

    assert_eq!(
        resolver.resolve(&parts("p."), Some(&pause)).await,
        vec!["x", "distanceTo", "_scale", "id", "toString", "name"]
    );
    assert_eq!(
        resolver.resolve(&parts("p.to"), Some(&pause)).await,
        vec!["toString"]
    );
}

#[tokio::test]
async fn static_members_surface_named_constructors() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, Vec::new());

    assert_eq!(
        resolver.resolve(&parts("Point."), Some(&pause)).await,
        vec!["zero", "origin", "parse"]
    );
}

#[tokio::test]
async fn this_contributes_instance_and_static_members() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = paused_at(frame(
        Some(function(
            "distanceTo",
            FuncOwner::Class(fixture.point.clone()),
            false,
        )),
        vec![(
            "this",
            Value::Instance(object_of("objects/this", &fixture.point)),
        )],
    ));

    assert_eq!(
        resolver.resolve(&parts("ze"), Some(&pause)).await,
        vec!["zero"]
    );
    assert_eq!(
        resolver.resolve(&parts("1 + "), Some(&pause)).await,
        vec![
            "this",
            "x",
            "distanceTo",
            "_scale",
            "id",
            "toString",
            "name",
            "zero",
            "origin",
            "parse",
        ]
    );
}

#[tokio::test]
async fn private_members_of_other_libraries_are_hidden() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    let resolver = session(&service).resolver();

    // Paused in a library that is neither `Point`'s nor `Base`'s.
    let elsewhere = library_ref("libraries/other", "package:other/other.dart");
    let pause = app_frame(&elsewhere, Vec::new());
    assert_eq!(
        resolver.resolve(&parts("p._"), Some(&pause)).await,
        Vec::<String>::new()
    );

    let pause = app_frame(&fixture.app, Vec::new());
    assert_eq!(
        resolver.resolve(&parts("p._"), Some(&pause)).await,
        vec!["_scale"]
    );
}

#[tokio::test]
async fn receiver_failures_yield_no_candidates() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    service.set_evaluation(
        0,
        "broken",
        Ok(Value::Error(ErrorRef {
            id: ObjectId::new("objects/error"),
            message: "NoSuchMethodError".to_string(),
        })),
    );
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, Vec::new());

    assert!(resolver
        .resolve(&parts("broken."), Some(&pause))
        .await
        .is_empty());
    assert!(resolver
        .resolve(&parts("unknown."), Some(&pause))
        .await
        .is_empty());
}

struct LibraryFixture {
    app: LibraryRef,
}

/// `app` imports `util` (which re-exports `extra`), `math` with a prefix,
/// `io` with a `hide` and exports `api` itself.
fn library_fixture(service: &MockVmService) -> LibraryFixture {
    let app = library_ref("libraries/app", "package:app/app.dart");
    let util = library_ref("libraries/util", "package:util/util.dart");
    let extra = library_ref("libraries/extra", "package:util/extra.dart");
    let math = library_ref("libraries/math", "dart:math");
    let io = library_ref("libraries/io", "dart:io");
    let api = library_ref("libraries/api", "package:app/api.dart");

    let widget = class_ref("classes/Widget", "Widget", &app);
    service.insert_object(library_object(
        &app,
        &["_counter", "appName"],
        &["main", "_helper", "value="],
        vec![widget],
        vec![
            import(&util),
            LibraryDependency {
                prefix: Some("math".to_string()),
                ..import(&math)
            },
            LibraryDependency {
                hides: vec!["exit".to_string()],
                ..import(&io)
            },
            LibraryDependency {
                is_import: false,
                ..import(&api)
            },
        ],
    ));
    service.insert_object(library_object(
        &util,
        &["_utilPrivate"],
        &["format", "applyDefaults"],
        Vec::new(),
        vec![LibraryDependency {
            is_import: false,
            ..import(&extra)
        }],
    ));
    service.insert_object(library_object(
        &extra,
        &[],
        &["reexported"],
        Vec::new(),
        Vec::new(),
    ));
    service.insert_object(library_object(&math, &["pi"], &["max"], Vec::new(), Vec::new()));
    service.insert_object(library_object(
        &io,
        &["stdout"],
        &["exit", "sleep"],
        Vec::new(),
        Vec::new(),
    ));
    service.insert_object(library_object(
        &api,
        &[],
        &["apiCall"],
        Vec::new(),
        Vec::new(),
    ));

    LibraryFixture { app }
}

#[tokio::test]
async fn library_scope_includes_unprefixed_imports_and_prefixes() {
    let service = Arc::new(MockVmService::new());
    let fixture = library_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, vec![("local", int("objects/1", 1))]);

    assert_eq!(
        resolver.resolve(&parts(""), Some(&pause)).await,
        vec![
            "local",
            "_counter",
            "appName",
            "main",
            "_helper",
            "value",
            "Widget",
            "math",
            "format",
            "applyDefaults",
            "stdout",
            "sleep",
        ]
    );
}

#[tokio::test]
async fn private_prefix_only_matches_the_current_library() {
    let service = Arc::new(MockVmService::new());
    let fixture = library_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, Vec::new());

    assert_eq!(
        resolver.resolve(&parts("_"), Some(&pause)).await,
        vec!["_counter", "_helper"]
    );
}

#[tokio::test]
async fn re_exported_names_are_never_offered() {
    let service = Arc::new(MockVmService::new());
    let fixture = library_fixture(&service);
    let resolver = session(&service).resolver();
    let pause = app_frame(&fixture.app, Vec::new());

    assert!(resolver.resolve(&parts("re"), Some(&pause)).await.is_empty());
    assert!(resolver.resolve(&parts("api"), Some(&pause)).await.is_empty());
    assert_eq!(service.fetch_count(&ObjectId::new("libraries/extra")), 0);
    assert_eq!(service.fetch_count(&ObjectId::new("libraries/api")), 0);
}

#[tokio::test]
async fn concurrent_lookups_fetch_each_class_once() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    let session = session(&service);
    let resolver = session.resolver();
    let pause = app_frame(&fixture.app, Vec::new());
    let member_access = parts("p.");

    let (first, second) = tokio::join!(
        resolver.resolve(&member_access, Some(&pause)),
        resolver.resolve(&member_access, Some(&pause))
    );
    assert_eq!(first, second);
    assert_eq!(service.fetch_count(&ObjectId::new("classes/Point")), 1);
    assert_eq!(service.fetch_count(&ObjectId::new("classes/Base")), 1);

    resolver.resolve(&member_access, Some(&pause)).await;
    assert_eq!(service.fetch_count(&ObjectId::new("classes/Point")), 1);

    session.disconnect();
    resolver.resolve(&member_access, Some(&pause)).await;
    assert_eq!(service.fetch_count(&ObjectId::new("classes/Point")), 2);
}

#[tokio::test]
async fn stale_results_are_discarded() {
    let service = Arc::new(MockVmService::new());
    let fixture = point_fixture(&service);
    service.set_evaluation(0, "slow", Ok(Value::Instance(object_of("objects/slow", &fixture.point))));
    let gate = service.gate_evaluation("slow");

    let session = session(&service);
    let controller = AutocompleteController::new(session.resolver());
    let results = controller.results();
    let pause = app_frame(&fixture.app, vec![("fooLocal", int("objects/1", 1))]);

    let slow = parts("slow.");
    let fast = parts("foo");
    let (slow_applied, fast_applied) = tokio::join!(controller.update(&slow, Some(&pause)), async {
        let applied = controller.update(&fast, Some(&pause)).await;
        gate.notify_one();
        applied
    });

    assert!(!slow_applied);
    assert!(fast_applied);
    assert_eq!(results.get(), vec!["fooLocal"]);

    controller.cancel();
    assert!(results.get().is_empty());
}
