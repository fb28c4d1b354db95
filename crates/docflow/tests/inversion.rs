//! Requested values flowing back to where they can be stored.

use docflow::statevar::dependency::{Dependency, DependencySpec};
use docflow::statevar::{Definition, StateVarDef};
use docflow::{
    ComponentCatalog, ComponentType, CoreConfig, CoreError, DocumentCore, InverseFailureReason, SerializedComponent,
    UpdateOptions, Value, ValueRequest,
};
use std::sync::Arc;

fn document(children: Vec<SerializedComponent>) -> DocumentCore {
    let root = children
        .into_iter()
        .fold(SerializedComponent::new("document"), SerializedComponent::child);
    DocumentCore::with_config(&root, &CoreConfig::default()).unwrap()
}

fn vertices(core: &mut DocumentCore, name: &str) -> Vec<(f64, f64)> {
    let count = core.resolve(name, "numVertices").unwrap().to_number() as usize;
    (0..count)
        .map(|row| {
            let x = core.resolve_entry(name, "vertices", row * 2).unwrap().to_number();
            let y = core.resolve_entry(name, "vertices", row * 2 + 1).unwrap().to_number();
            (x, y)
        })
        .collect()
}

fn assert_close(actual: &[(f64, f64)], expected: &[(f64, f64)]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a.0 - e.0).abs() < 1e-9 && (a.1 - e.1).abs() < 1e-9,
            "{actual:?} != {expected:?}"
        );
    }
}

#[test]
fn requested_value_comes_back() {
    let mut core = document(vec![SerializedComponent::new("number").named("n")]);
    let outcome = core
        .request_value("n", "value", Value::Number(7.0), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.actual("n", "value"), Some(&Value::Number(7.0)));
    assert_eq!(core.resolve("n", "value").unwrap(), Value::Number(7.0));
    assert_eq!(core.history().len(), 1);
}

#[test]
fn edits_reach_the_text_a_number_is_written_in() {
    let mut core = document(vec![
        SerializedComponent::new("number")
            .named("n")
            .child(SerializedComponent::new("text").named("t").text("1")),
    ]);
    let outcome = core
        .request_value("n", "value", Value::Number(2.5), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("t", "value").unwrap(), Value::text("2.5"));
    assert_eq!(core.resolve("n", "value").unwrap(), Value::Number(2.5));
}

#[test]
fn failed_inversion_reverts_the_input() {
    let mut core = document(vec![
        SerializedComponent::new("text").named("t").text("a").text("b"),
        SerializedComponent::new("textInput").named("in").attr("bindValueTo", "$t"),
    ]);
    assert_eq!(core.resolve("in", "immediateValue").unwrap(), Value::text("ab"));

    let typed = core
        .perform_action("in", "updateImmediateValue", Value::text("xyz"), &UpdateOptions::default())
        .unwrap();
    assert!(typed.success);
    assert_eq!(core.resolve("in", "immediateValue").unwrap(), Value::text("xyz"));
    assert!(core.history().is_empty());

    let committed = core
        .perform_action("in", "updateValue", Value::Null, &UpdateOptions::default())
        .unwrap();
    assert!(!committed.success);
    let failure = committed.failure.as_ref().unwrap();
    assert!(matches!(failure.reason, InverseFailureReason::Rejected(_)));
    assert_eq!(committed.actual("in", "immediateValue"), Some(&Value::text("ab")));
    assert_eq!(core.resolve("t", "value").unwrap(), Value::text("ab"));
    assert_eq!(core.resolve("in", "value").unwrap(), Value::text("ab"));
}

#[test]
fn committed_input_writes_through_its_binding() {
    let mut core = document(vec![
        SerializedComponent::new("text").named("t").text("old"),
        SerializedComponent::new("textInput").named("in").attr("bindValueTo", "$t"),
    ]);
    core.perform_action("in", "updateImmediateValue", Value::text("new"), &UpdateOptions::default())
        .unwrap();
    let committed = core
        .perform_action("in", "updateValue", Value::Null, &UpdateOptions::default())
        .unwrap();
    assert!(committed.success);
    assert_eq!(core.resolve("t", "value").unwrap(), Value::text("new"));
    assert_eq!(core.resolve("in", "immediateValue").unwrap(), Value::text("new"));
    assert_eq!(core.history().len(), 1);
}

#[test]
fn transient_updates_stay_out_of_history() {
    let mut core = document(vec![SerializedComponent::new("number").named("n")]);
    let outcome = core
        .request_value("n", "value", Value::Number(1.0), &UpdateOptions::transient())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("n", "value").unwrap(), Value::Number(1.0));
    assert!(core.history().is_empty());

    core.request_value("n", "value", Value::Number(2.0), &UpdateOptions::labelled("set n"))
        .unwrap();
    assert_eq!(core.history().len(), 1);
    assert_eq!(core.history()[0].label, "set n");
}

#[test]
fn fixed_components_refuse_writes() {
    let mut core = document(vec![SerializedComponent::new("number").named("n").attr("fixed", true)]);
    let outcome = core
        .request_value("n", "value", Value::Number(3.0), &UpdateOptions::default())
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.failure.unwrap().reason, InverseFailureReason::Fixed);
    assert!(core.resolve("n", "value").unwrap().to_number().is_nan());
}

#[test]
fn moving_a_point_touches_only_its_coordinates() {
    let mut core = document(vec![SerializedComponent::new("point").named("p").attr("coords", "(1, 2)")]);
    assert_eq!(core.resolve("p", "x2").unwrap(), Value::Number(2.0));
    let outcome = core
        .perform_action(
            "p",
            "movePoint",
            Value::record([
                ("x".to_string(), Value::Number(-3.0)),
                ("y".to_string(), Value::Number(4.0)),
            ]),
            &UpdateOptions::default(),
        )
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("p", "x1").unwrap(), Value::Number(-3.0));
    assert_eq!(core.resolve("p", "x2").unwrap(), Value::Number(4.0));
    assert_eq!(core.resolve("p", "coords").unwrap().to_text(), "(-3, 4)");
}

#[test]
fn rigid_polygon_translates_when_two_vertices_move_together() {
    let mut core = document(vec![
        SerializedComponent::new("polygon")
            .named("p")
            .attr("rigid", true)
            .attr("vertices", "(1,1), (-1,1), (-1,-1), (1,-1)"),
    ]);
    let id = core.component_id("p").unwrap();
    let requests = vec![
        ValueRequest::new(id, "vertex1_1", Value::Number(2.0)),
        ValueRequest::new(id, "vertex1_2", Value::Number(2.0)),
        ValueRequest::new(id, "vertex2_1", Value::Number(0.0)),
        ValueRequest::new(id, "vertex2_2", Value::Number(2.0)),
    ];
    let outcome = core.request_values(requests, &UpdateOptions::default()).unwrap();
    assert!(outcome.success);
    assert_close(
        &vertices(&mut core, "p"),
        &[(2.0, 2.0), (0.0, 2.0), (0.0, 0.0), (2.0, 0.0)],
    );
}

#[test]
fn rigid_polygon_rotates_about_its_centroid_when_one_vertex_moves() {
    let mut core = document(vec![
        SerializedComponent::new("polygon")
            .named("p")
            .attr("rigid", true)
            .attr("vertices", "(1,1), (-1,1), (-1,-1), (1,-1)"),
    ]);
    let id = core.component_id("p").unwrap();
    let requests = vec![
        ValueRequest::new(id, "vertex1_1", Value::Number(-1.0)),
        ValueRequest::new(id, "vertex1_2", Value::Number(1.0)),
    ];
    let outcome = core.request_values(requests, &UpdateOptions::default()).unwrap();
    assert!(outcome.success);
    assert_close(
        &vertices(&mut core, "p"),
        &[(-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0), (1.0, 1.0)],
    );
}

#[test]
fn loose_polygon_moves_only_the_requested_vertex() {
    let mut core = document(vec![
        SerializedComponent::new("polygon")
            .named("p")
            .attr("vertices", "(1,1), (-1,1), (-1,-1), (1,-1)"),
    ]);
    let id = core.component_id("p").unwrap();
    let requests = vec![
        ValueRequest::new(id, "vertex1_1", Value::Number(5.0)),
        ValueRequest::new(id, "vertex1_2", Value::Number(6.0)),
    ];
    assert!(core.request_values(requests, &UpdateOptions::default()).unwrap().success);
    assert_close(
        &vertices(&mut core, "p"),
        &[(5.0, 6.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)],
    );
}

fn triangle() -> DocumentCore {
    document(vec![
        SerializedComponent::new("polygon")
            .named("p")
            .attr("rigid", true)
            .attr("vertices", "(0,0), (3,0), (0,3)"),
    ])
}

/// Side lengths and centroid of a triangle rotated from (0,0), (3,0), (0,3).
fn assert_rotated_triangle(actual: &[(f64, f64)]) {
    let side = |a: (f64, f64), b: (f64, f64)| (a.0 - b.0).hypot(a.1 - b.1);
    assert_eq!(actual.len(), 3);
    assert!((side(actual[0], actual[1]) - 3.0).abs() < 1e-9, "{actual:?}");
    assert!((side(actual[0], actual[2]) - 3.0).abs() < 1e-9, "{actual:?}");
    assert!((side(actual[1], actual[2]) - 18f64.sqrt()).abs() < 1e-9, "{actual:?}");
    let cx = actual.iter().map(|v| v.0).sum::<f64>() / 3.0;
    let cy = actual.iter().map(|v| v.1).sum::<f64>() / 3.0;
    assert!((cx - 1.0).abs() < 1e-9 && (cy - 1.0).abs() < 1e-9, "{actual:?}");
    // The second vertex turns onto the ray from the centroid through (4, 1).
    assert_close(&actual[1..2], &[(1.0 + 5f64.sqrt(), 1.0)]);
}

#[test]
fn rigid_triangle_translates_when_two_of_three_points_move_together() {
    let mut core = triangle();
    let id = core.component_id("p").unwrap();
    let requests = vec![
        ValueRequest::new(id, "vertex1_1", Value::Number(1.0)),
        ValueRequest::new(id, "vertex1_2", Value::Number(1.0)),
        ValueRequest::new(id, "vertex2_1", Value::Number(4.0)),
        ValueRequest::new(id, "vertex2_2", Value::Number(1.0)),
    ];
    assert!(core.request_values(requests, &UpdateOptions::default()).unwrap().success);
    assert_close(&vertices(&mut core, "p"), &[(1.0, 1.0), (4.0, 1.0), (1.0, 4.0)]);
}

#[test]
fn rigid_triangle_rotates_when_one_of_three_points_moves() {
    let mut core = triangle();
    let id = core.component_id("p").unwrap();
    let requests = vec![
        ValueRequest::new(id, "vertex2_1", Value::Number(4.0)),
        ValueRequest::new(id, "vertex2_2", Value::Number(1.0)),
    ];
    assert!(core.request_values(requests, &UpdateOptions::default()).unwrap().success);
    assert_rotated_triangle(&vertices(&mut core, "p"));
}

#[test]
fn moving_a_rigid_polygon_by_its_whole_vertex_list_rotates_it() {
    // Only the second vertex differs from where it already is.
    let mut core = triangle();
    let restated = Value::array([
        Value::array([Value::Number(0.0), Value::Number(0.0)]),
        Value::array([Value::Number(4.0), Value::Number(1.0)]),
        Value::array([Value::Number(0.0), Value::Number(3.0)]),
    ]);
    let outcome = core
        .perform_action(
            "p",
            "movePolygon",
            Value::record([("vertices".to_string(), restated)]),
            &UpdateOptions::default(),
        )
        .unwrap();
    assert!(outcome.success);
    assert_rotated_triangle(&vertices(&mut core, "p"));
}

#[test]
fn moving_one_vertex_by_number_rotates_a_rigid_polygon() {
    let mut core = triangle();
    let moved = Value::record([(
        "2".to_string(),
        Value::array([Value::Number(4.0), Value::Number(1.0)]),
    )]);
    let outcome = core
        .perform_action(
            "p",
            "movePolygon",
            Value::record([("vertices".to_string(), moved)]),
            &UpdateOptions::default(),
        )
        .unwrap();
    assert!(outcome.success);
    assert_rotated_triangle(&vertices(&mut core, "p"));

    let unnumbered = Value::record([(
        "second".to_string(),
        Value::array([Value::Number(4.0), Value::Number(1.0)]),
    )]);
    let refused = core.perform_action(
        "p",
        "movePolygon",
        Value::record([("vertices".to_string(), unnumbered)]),
        &UpdateOptions::default(),
    );
    assert!(matches!(refused, Err(CoreError::InvalidActionArguments { .. })));
}

#[test]
fn one_refused_request_writes_nothing() {
    let mut core = document(vec![
        SerializedComponent::new("number").named("a"),
        SerializedComponent::new("number").named("b").attr("fixed", true),
    ]);
    let (a, b) = (core.component_id("a").unwrap(), core.component_id("b").unwrap());
    let requests = vec![
        ValueRequest::new(a, "value", Value::Number(1.0)),
        ValueRequest::new(b, "value", Value::Number(2.0)),
    ];
    let outcome = core.request_values(requests, &UpdateOptions::default()).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.failure.unwrap().reason, InverseFailureReason::Fixed);
    assert!(core.resolve("a", "value").unwrap().to_number().is_nan());
    assert!(core.history().is_empty());
}

#[test]
fn writing_past_the_end_of_an_array_fails() {
    let mut core = document(vec![SerializedComponent::new("point").named("p").attr("coords", "(3, 4, 5)")]);
    let outcome = core
        .request_value("p", "x4", Value::Number(1.0), &UpdateOptions::default())
        .unwrap();
    assert!(!outcome.success);
    let reason = outcome.failure.unwrap().reason;
    assert!(matches!(reason, InverseFailureReason::NoSuchArrayKey(_)), "{reason:?}");
    assert_eq!(core.resolve("p", "coords").unwrap().to_text(), "(3, 4, 5)");
}

/// `a` reads `b` only while `mode` is on, and `b` always reads `a`.
struct Switch;

impl ComponentType for Switch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("mode")
                .essential(Value::Bool(false))
                .definition(|_| Definition::essential_or(Value::Bool(false))),
            StateVarDef::scalar("a")
                .determined_by(&["mode"])
                .essential(Value::Number(0.0))
                .dependencies(|determining| match determining.get("mode").as_bool() {
                    Some(true) => DependencySpec::new().with("b", Dependency::own("b")),
                    _ => DependencySpec::new(),
                })
                .definition(|deps| match deps.is_present("b") {
                    true => Definition::value(deps.value("b").clone()),
                    false => Definition::essential_or(Value::Number(0.0)),
                }),
            StateVarDef::scalar("b")
                .dependencies(|_| DependencySpec::new().with("a", Dependency::own("a")))
                .definition(|deps| Definition::value(deps.value("a").clone())),
        ]
    }
}

#[test]
fn writes_that_close_a_cycle_are_rolled_back() {
    let config = CoreConfig::default();
    let catalog = ComponentCatalog::standard(&config).with(Switch);
    let root = SerializedComponent::new("document").child(SerializedComponent::new("switch").named("w"));
    let mut core = DocumentCore::new(&root, Arc::new(catalog)).unwrap();
    let id = core.component_id("w").unwrap();

    let requests = vec![
        ValueRequest::new(id, "mode", Value::Bool(true)),
        ValueRequest::new(id, "a", Value::Number(5.0)),
    ];
    let outcome = core.request_values(requests, &UpdateOptions::default()).unwrap();
    assert!(!outcome.success);
    let reason = outcome.failure.unwrap().reason;
    assert!(
        matches!(&reason, InverseFailureReason::Core(error) if error.is_cycle()),
        "{reason:?}"
    );
    assert_eq!(core.resolve("w", "mode").unwrap(), Value::Bool(false));
    assert_eq!(core.resolve("w", "a").unwrap(), Value::Number(0.0));
    assert!(core.history().is_empty());
}

#[test]
fn snapshots_restore_written_values() {
    let mut core = document(vec![SerializedComponent::new("number").named("n")]);
    core.request_value("n", "value", Value::Number(1.0), &UpdateOptions::default())
        .unwrap();
    let snapshot = core.snapshot_essential();
    core.request_value("n", "value", Value::Number(9.0), &UpdateOptions::default())
        .unwrap();
    let restored = core.restore_essential(&snapshot).unwrap();
    assert!(restored.success);
    assert_eq!(core.resolve("n", "value").unwrap(), Value::Number(1.0));
}
