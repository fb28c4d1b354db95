//! Forward resolution: laziness, caching and change suppression.

use docflow::statevar::dependency::{Dependency, DependencySpec};
use docflow::statevar::{Definition, StateVarDef};
use docflow::{
    ComponentCatalog, ComponentType, CoreConfig, CoreError, DocumentCore, SerializedComponent, Severity,
    SourcePosition, UpdateOptions, Value,
};
use std::sync::Arc;

fn document(children: Vec<SerializedComponent>) -> DocumentCore {
    let root = children
        .into_iter()
        .fold(SerializedComponent::new("document"), SerializedComponent::child);
    DocumentCore::with_config(&root, &CoreConfig::default()).unwrap()
}

#[test]
fn second_pass_runs_no_definitions() {
    let mut core = document(vec![
        SerializedComponent::new("number").named("n").text("37/3"),
        SerializedComponent::new("math").named("m").text("x + 1"),
        SerializedComponent::new("point").named("p").attr("coords", "(1, 2)"),
    ]);
    let first = core.resolve_renderer_state().unwrap();
    assert!(!first.is_empty());
    assert!(core.stats().total_definitions() > 0);

    core.reset_stats();
    let second = core.resolve_renderer_state().unwrap();
    assert_eq!(core.stats().total_definitions(), 0);
    assert_eq!(first, second);
}

#[test]
fn rewriting_the_same_value_changes_nothing() {
    let mut core = document(vec![SerializedComponent::new("number").named("n")]);
    let outcome = core
        .request_value("n", "value", Value::Number(4.0), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));

    core.reset_stats();
    let outcome = core
        .request_value("n", "value", Value::Number(4.0), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));
    assert_eq!(core.stats().total_definitions(), 0);
}

#[test]
fn equal_recomputed_value_stops_propagation() {
    let mut core = document(vec![
        SerializedComponent::new("number")
            .named("n")
            .child(SerializedComponent::new("text").named("t").text("8/2")),
    ]);
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));
    let value = core.node_key("n", "value").unwrap();
    let is_integer = core.node_key("n", "isInteger").unwrap();

    core.reset_stats();
    let outcome = core
        .request_value("t", "value", Value::text("2*2"), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));
    assert_eq!(core.stats().definitions_of(&value), 1);
    assert_eq!(core.stats().definitions_of(&is_integer), 0);
}

#[test]
fn only_the_dependent_cone_reevaluates() {
    let mut core = document(vec![
        SerializedComponent::new("number")
            .named("n")
            .child(SerializedComponent::new("text").named("t").text("37/3")),
        SerializedComponent::new("number").named("other").text("5"),
    ]);
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(false));
    assert_eq!(core.resolve("other", "isInteger").unwrap(), Value::Bool(true));
    let other = core.component_id("other").unwrap();

    core.reset_stats();
    let outcome = core
        .request_value("t", "value", Value::text("36/3"), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.actual("t", "value"), Some(&Value::text("36/3")));
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));
    assert_eq!(core.resolve("n", "value").unwrap(), Value::Number(12.0));

    let is_integer = core.node_key("n", "isInteger").unwrap();
    assert_eq!(core.stats().definitions_of(&is_integer), 1);
    assert!(core.stats().evaluated_nodes().all(|node| node.component != other));
}

/// Two variables that read each other.
struct Loop;

impl ComponentType for Loop {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("a")
                .dependencies(|_| DependencySpec::new().with("b", Dependency::own("b")))
                .definition(|deps| Definition::value(deps.value("b").clone())),
            StateVarDef::scalar("b")
                .dependencies(|_| DependencySpec::new().with("a", Dependency::own("a")))
                .definition(|deps| Definition::value(deps.value("a").clone())),
            StateVarDef::scalar("free").definition(|_| Definition::value(1.0)),
        ]
    }
}

#[test]
fn cycles_are_reported_with_their_path() {
    let config = CoreConfig::default();
    let catalog = ComponentCatalog::standard(&config).with(Loop);
    let root = SerializedComponent::new("document").child(SerializedComponent::new("loop").named("l"));
    let mut core = DocumentCore::new(&root, Arc::new(catalog)).unwrap();

    let error = core.resolve("l", "a").unwrap_err();
    let CoreError::Cycle { path } = &error else {
        panic!("expected a cycle, got {error:?}");
    };
    assert_eq!(path.first().map(String::as_str), Some("l.a"));
    assert_eq!(path.last().map(String::as_str), Some("l.a"));
    assert!(path.iter().any(|step| step == "l.b"));

    // The rest of the component still resolves.
    assert_eq!(core.resolve("l", "free").unwrap(), Value::Number(1.0));
    assert!(core.resolve("l", "b").unwrap_err().is_cycle());
}

#[test]
fn broken_math_warns_at_its_position() {
    let mut core = document(vec![SerializedComponent::new("math").named("m").text("1 +").at(10, 30)]);
    assert!(core.resolve("m", "value").unwrap().is_error());
    let warning = core.diagnostics().warnings().next().unwrap();
    assert_eq!(warning.component.as_deref(), Some("m"));
    assert_eq!(warning.position, Some(SourcePosition { start: 10, end: 30 }));
}

#[test]
fn unknown_types_and_missing_targets_are_errors() {
    let mut core = document(vec![
        SerializedComponent::new("gadget").named("g"),
        SerializedComponent::new("copy").named("c").attr("target", "nowhere"),
    ]);
    assert!(core.diagnostics().has_errors());
    assert!(core.replacement_names("c").unwrap().is_empty());
    assert!(core.resolve("c", "signature").unwrap().is_error());
    assert!(
        core.diagnostics()
            .entries()
            .any(|diagnostic| diagnostic.severity == Severity::Error && diagnostic.message.contains("gadget"))
    );
}

#[test]
fn unknown_names_are_errors_not_values() {
    let mut core = document(vec![SerializedComponent::new("number").named("n")]);
    assert!(matches!(
        core.resolve("nobody", "value"),
        Err(CoreError::UnknownComponent(_))
    ));
    assert!(matches!(
        core.resolve("n", "nothing"),
        Err(CoreError::UnknownStateVariable { .. })
    ));
}

#[test]
fn display_settings_inherit_from_containers() {
    let root = SerializedComponent::new("document").child(
        SerializedComponent::new("section")
            .named("s")
            .attr("displayDecimals", 2.0)
            .child(SerializedComponent::new("number").named("n").text("2/3")),
    );
    let mut core = DocumentCore::with_config(&root, &CoreConfig::default()).unwrap();
    assert_eq!(core.resolve("n", "text").unwrap(), Value::text("0.67"));
}

#[test]
fn traced_changes_name_their_cause() {
    let mut config = CoreConfig::default();
    config.diagnostics.trace_changes = true;
    let root = SerializedComponent::new("document").child(SerializedComponent::new("number").named("n").text("37/3"));
    let mut core = DocumentCore::with_config(&root, &config).unwrap();
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(false));

    core.request_value("n", "value", Value::Number(12.0), &UpdateOptions::default())
        .unwrap();
    assert_eq!(core.resolve("n", "isInteger").unwrap(), Value::Bool(true));
    let chain = core.why_did_change("n", "isInteger").unwrap();
    assert!(chain[0].starts_with("n.isInteger "), "{chain:?}");
    assert!(chain.iter().any(|step| step.starts_with("n.value ")), "{chain:?}");
}
