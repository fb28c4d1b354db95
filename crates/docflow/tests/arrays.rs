//! Array variables resolve entry by entry.

use docflow::engine::address::NodePart;
use docflow::{CoreConfig, DocumentCore, SerializedComponent, UpdateOptions, Value};

fn sequence(length: f64) -> DocumentCore {
    let root = SerializedComponent::new("document")
        .child(SerializedComponent::new("sequence").named("s").attr("length", length));
    DocumentCore::with_config(&root, &CoreConfig::default()).unwrap()
}

#[test]
fn one_entry_of_a_hundred() {
    let mut core = sequence(100.0);
    let values = core.node_key("s", "values").unwrap();
    core.reset_stats();

    assert_eq!(core.resolve_entry("s", "values", 3).unwrap(), Value::Number(4.0));
    let entries: Vec<NodePart> = core
        .stats()
        .evaluated_nodes()
        .filter(|node| node.component == values.component && node.variable == values.variable)
        .map(|node| node.part)
        .filter(|part| matches!(part, NodePart::Entry(_)))
        .collect();
    assert_eq!(entries, vec![NodePart::Entry(3)]);
}

#[test]
fn entries_past_the_end_are_null() {
    let mut core = sequence(3.0);
    assert_eq!(core.resolve_entry("s", "values", 2).unwrap(), Value::Number(3.0));
    assert_eq!(core.resolve_entry("s", "values", 3).unwrap(), Value::Null);
}

#[test]
fn whole_array_and_size() {
    let mut core = sequence(3.0);
    assert_eq!(
        core.resolve("s", "values").unwrap(),
        Value::array([Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)])
    );
    assert_eq!(core.resolve("s", "numValues").unwrap(), Value::Number(3.0));
}

#[test]
fn resizing_follows_the_length() {
    let mut core = sequence(3.0);
    assert_eq!(core.resolve_entry("s", "values", 1).unwrap(), Value::Number(2.0));
    let outcome = core
        .request_value("s", "length", Value::Number(5.0), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(core.resolve("s", "numValues").unwrap(), Value::Number(5.0));
    assert_eq!(core.resolve_entry("s", "values", 1).unwrap(), Value::Number(2.0));
    assert_eq!(core.resolve_entry("s", "values", 4).unwrap(), Value::Number(5.0));
    assert_eq!(core.replacement_names("s").unwrap().len(), 5);
}

#[test]
fn entry_aliases_address_single_coordinates() {
    let root = SerializedComponent::new("document")
        .child(SerializedComponent::new("point").named("p").attr("coords", "(3, 4, 5)"));
    let mut core = DocumentCore::with_config(&root, &CoreConfig::default()).unwrap();
    assert_eq!(core.resolve("p", "x3").unwrap(), Value::Number(5.0));
    assert_eq!(core.resolve("p", "x4").unwrap(), Value::Null);

    let outcome = core
        .request_value("p", "x2", Value::Number(-1.0), &UpdateOptions::default())
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.actual("p", "x2"), Some(&Value::Number(-1.0)));
    assert_eq!(core.resolve("p", "x1").unwrap(), Value::Number(3.0));
    assert_eq!(core.resolve("p", "coords").unwrap().to_text(), "(3, -1, 5)");
}
