//! Composite types: `sequence`, `repeat` and `copy`.
//!
//! Each one reduces whatever decides its replacement list to a single
//! sentinel value. Replacements link back to the entries they show, so the
//! sentinel only changes when the list itself has to change, not when a
//! linked value does.

use super::ComponentType;
use super::basic::display_attributes;
use crate::component::attributes::AttributeSchema;
use crate::component::serialized::{SerializedComponent, SerializedNode};
use crate::composite::{CompositeDef, ExpansionContext};
use crate::config::CoreConfig;
use crate::engine::address::flat_key;
use crate::statevar::array::ArrayDef;
use crate::statevar::dependency::{ComponentTarget, Dependency, DependencySpec, VarSelector};
use crate::statevar::values::DependencyValues;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;

/// Component type that shows a value of the given kind.
fn type_for_kind(kind: &str) -> &'static str {
    match kind {
        "number" => "number",
        "text" => "text",
        "boolean" => "boolean",
        _ => "math",
    }
}

/// Kind of a value, looking into the first entry of arrays.
fn entry_kind(value: &Value) -> &'static str {
    match value.as_array() {
        Some(items) => items.first().map_or("number", entry_kind),
        None => value.kind_name(),
    }
}

pub struct Sequence;

fn sequence_length(deps: &DependencyValues) -> usize {
    let length = deps.number("length");
    if length.is_finite() {
        return length.max(0.0) as usize;
    }
    let (from, to, step) = (deps.number("from"), deps.number("to"), deps.number("step"));
    if !from.is_finite() || !to.is_finite() || !step.is_finite() || step == 0.0 {
        return 0;
    }
    let count = ((to - from) / step + 1e-9).floor() + 1.0;
    count.max(0.0) as usize
}

impl ComponentType for Sequence {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        let mut attributes = vec![
            AttributeSchema::number("from", Value::Number(1.0)),
            AttributeSchema::number("to", Value::Null),
            AttributeSchema::number("length", Value::Null),
            AttributeSchema::number("step", Value::Number(1.0)),
        ];
        attributes.extend(display_attributes());
        attributes
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        let values = ArrayDef::new(1)
            .size_dependencies(|_| {
                DependencySpec::new()
                    .with("from", Dependency::own("from"))
                    .with("to", Dependency::own("to"))
                    .with("length", Dependency::own("length"))
                    .with("step", Dependency::own("step"))
            })
            .size(|deps| vec![sequence_length(deps)])
            .global_dependencies(|_| {
                DependencySpec::new()
                    .with("from", Dependency::own("from"))
                    .with("step", Dependency::own("step"))
            })
            .definition_by_key(|entry| {
                let value = entry.global.number("from") + entry.key as f64 * entry.global.number("step");
                Definition::value(value)
            });
        vec![
            StateVarDef::array("values", values),
            StateVarDef::scalar("numValues").dependencies(|_| {
                DependencySpec::new().with(
                    "size",
                    Dependency::array_size(ComponentTarget::This, "values"),
                )
            })
            .definition(|deps| Definition::value(deps.array_len("size") as f64)),
        ]
    }

    fn composite(&self) -> Option<CompositeDef> {
        Some(CompositeDef::new("numValues", &[], |ctx| {
            let count = ctx.value("numValues").to_number().max(0.0) as usize;
            Ok((0..count.min(ctx.limit))
                .map(|index| SerializedComponent::new("number").linked_to(ctx.component, "values", Some(index)))
                .collect())
        }))
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("values")
    }
}

pub struct Repeat;

/// The `for` source read entry by entry. Sources whose primary variable is
/// not an array count as a list (math lists, arrays) or a single item.
fn source_entry(whole: &Value, key: usize) -> Value {
    match whole {
        Value::Array(items) => items.get(key).cloned().unwrap_or_default(),
        Value::Math(expr) => match expr.components() {
            Some(items) => items.get(key).cloned().map(Value::math).unwrap_or_default(),
            None if key == 0 => whole.clone(),
            None => Value::Null,
        },
        other if key == 0 => other.clone(),
        _ => Value::Null,
    }
}

fn source_len(whole: &Value) -> usize {
    match whole {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Math(expr) => expr.components().map_or(1, <[_]>::len),
        _ => 1,
    }
}

impl ComponentType for Repeat {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![
            AttributeSchema::reference("for"),
            AttributeSchema::text("valueName", "v"),
            AttributeSchema::text("indexName", "i"),
        ]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        let source = || ComponentTarget::Attribute("for".to_string());
        let sources = ArrayDef::new(1)
            .size_dependencies(move |determining| {
                let spec = DependencySpec::new();
                if determining.get("sourceShape").is_null() {
                    spec.with("whole", Dependency::state_var(source(), VarSelector::Primary).optional())
                } else {
                    spec.with("size", Dependency::array_size(source(), VarSelector::Primary))
                }
            })
            .size(|deps| match deps.is_present("size") {
                true => vec![deps.array_len("size")],
                false => vec![source_len(deps.value("whole"))],
            })
            .dependencies_by_key(move |key, _, determining| {
                let entry = if determining.get("sourceShape").is_null() {
                    Dependency::state_var(source(), VarSelector::Primary)
                } else {
                    Dependency::array_entry(source(), VarSelector::Primary, key)
                };
                DependencySpec::new()
                    .with("entry", entry.optional())
                    .with("fromArray", Dependency::constant(Value::Bool(!determining.get("sourceShape").is_null())))
            })
            .definition_by_key(|entry| {
                let value = entry.dependencies.value("entry");
                match entry.dependencies.value("fromArray").as_bool() {
                    Some(true) => Definition::value(value.clone()),
                    _ => Definition::value(source_entry(value, entry.key)),
                }
            });
        vec![
            StateVarDef::scalar("sourceShape")
                .dependencies(move |_| {
                    DependencySpec::new()
                        .with("size", Dependency::array_size(source(), VarSelector::Primary).optional())
                })
                .definition(|deps| Definition::value(deps.value("size").clone())),
            StateVarDef::array("sourceValues", sources).determined_by(&["sourceShape"]),
            StateVarDef::scalar("numIterations")
                .dependencies(|_| {
                    DependencySpec::new()
                        .with("size", Dependency::array_size(ComponentTarget::This, "sourceValues"))
                        .with(
                            "first",
                            Dependency::array_entry(ComponentTarget::This, "sourceValues", 0).optional(),
                        )
                })
                .definition(|deps| {
                    let count = deps.array_len("size");
                    let kind = if count == 0 { "number" } else { entry_kind(deps.value("first")) };
                    Definition::value(Value::record([
                        ("count".to_string(), Value::Number(count as f64)),
                        ("valueType".to_string(), Value::text(type_for_kind(kind))),
                    ]))
                }),
        ]
    }

    fn composite(&self) -> Option<CompositeDef> {
        Some(CompositeDef::new("numIterations", &["valueName", "indexName"], iterations))
    }

    fn keeps_serialized_children(&self) -> bool {
        true
    }
}

fn iterations(ctx: &ExpansionContext<'_>) -> Result<Vec<SerializedComponent>, String> {
    let sentinel = ctx.value("numIterations");
    let count = (sentinel.field("count").to_number().max(0.0) as usize).min(ctx.limit);
    let value_type = sentinel.field("valueType").to_text();
    let value_name = ctx.value("valueName").to_text();
    let index_name = ctx.value("indexName").to_text();
    let mut replacements = Vec::with_capacity(count);
    for index in 0..count {
        let mut iteration = SerializedComponent::new("_iteration")
            .child(
                SerializedComponent::new(&value_type)
                    .named(&value_name)
                    .linked_to(ctx.component, "sourceValues", Some(index)),
            )
            .child(
                SerializedComponent::new("number")
                    .named(&index_name)
                    .text(&(index + 1).to_string()),
            );
        iteration.children.extend(ctx.template.iter().filter(|node| !is_blank(node)).cloned());
        replacements.push(iteration);
    }
    Ok(replacements)
}

fn is_blank(node: &SerializedNode) -> bool {
    matches!(node, SerializedNode::Text(text) if text.trim().is_empty())
}

/// Group produced per repeat entry, scoping the value and index names.
pub struct Iteration;

impl ComponentType for Iteration {
    fn name(&self) -> &'static str {
        "_iteration"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        Vec::new()
    }
}

/// `copy` of a component, of one of its variables, or of every replacement
/// of a composite.
pub struct CopyComponent;

impl ComponentType for CopyComponent {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![AttributeSchema::text("target", ""), AttributeSchema::text("prop", "")]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("targetIdentity")
                .determined_by(&["target"])
                .dependencies(|determining| {
                    let target = determining.get("target").to_text();
                    let identity = if target.is_empty() {
                        Dependency::constant(Value::error("copy has no target"))
                    } else {
                        Dependency::identity(ComponentTarget::Named(target))
                    };
                    DependencySpec::new().with("identity", identity)
                })
                .definition(|deps| Definition::value(deps.value("identity").clone())),
            StateVarDef::scalar("signature")
                .determined_by(&["targetIdentity", "prop"])
                .dependencies(signature_dependencies)
                .definition(signature),
        ]
    }

    fn composite(&self) -> Option<CompositeDef> {
        Some(CompositeDef::new("signature", &[], copies))
    }
}

fn signature_dependencies(determining: &crate::statevar::values::DeterminingValues) -> DependencySpec {
    let identity = determining.get("targetIdentity");
    let mut spec = DependencySpec::new().with("identity", Dependency::constant(identity.clone()));
    if identity.is_error() || identity.is_null() {
        return spec;
    }
    let target = ComponentTarget::Named(identity.field("name").to_text());
    let prop = determining.get("prop").to_text();
    spec.insert("prop", Dependency::constant(Value::text(prop.as_str())));
    let sentinel = identity.field("sentinel").to_text();
    if prop.is_empty() && !sentinel.is_empty() {
        spec.insert("count", Dependency::replacement_count(target.clone()));
        spec.insert("targetSentinel", Dependency::state_var(target, sentinel.as_str()));
        return spec;
    }
    let selector = if prop.is_empty() {
        VarSelector::Primary
    } else {
        VarSelector::Named(prop)
    };
    spec.insert("size", Dependency::array_size(target.clone(), selector.clone()).optional());
    spec.insert("value", Dependency::state_var(target, selector).optional());
    spec
}

/// Everything the replacement list of a copy depends on, and nothing that
/// only changes the copied values.
fn signature(deps: &DependencyValues) -> Definition {
    let identity = deps.value("identity");
    if identity.is_error() {
        return Definition::value(identity.clone());
    }
    let mut fields = identity.as_record().cloned().unwrap_or_default();
    fields.insert("prop".to_string(), deps.value("prop").clone());
    if deps.is_present("count") {
        fields.insert("count".to_string(), deps.value("count").clone());
        fields.insert("targetSentinel".to_string(), deps.value("targetSentinel").clone());
        return Definition::value(Value::Record(fields.into()));
    }
    if !deps.is_present("value") {
        let name = identity.field("name");
        let prop = deps.value("prop").to_text();
        return Definition::value(Value::error(match prop.is_empty() {
            true => format!("{name} has no value to copy"),
            false => format!("{name} has no variable '{prop}'"),
        }));
    }
    if deps.is_present("size") {
        fields.insert("shape".to_string(), deps.value("size").clone());
    }
    fields.insert("kind".to_string(), Value::text(entry_kind(deps.value("value"))));
    Definition::value(Value::Record(fields.into()))
}

fn copies(ctx: &ExpansionContext<'_>) -> Result<Vec<SerializedComponent>, String> {
    let signature = ctx.value("signature");
    let name = signature.field("name").to_text();
    let target = ctx
        .component_id(&name)
        .ok_or_else(|| format!("no component named '{name}'"))?;

    if !signature.field("count").is_null() {
        let mut replacements = Vec::new();
        for replacement in ctx.replacements_of(target).iter().take(ctx.limit) {
            let Some(ty) = ctx.type_of(*replacement) else {
                continue;
            };
            let Some(primary) = ty.primary_variable else {
                continue;
            };
            replacements.push(SerializedComponent::new(ty.copy_as).linked_to(*replacement, primary, None));
        }
        return Ok(replacements);
    }

    let ty = ctx.type_of(target).ok_or_else(|| format!("'{name}' is gone"))?;
    let prop = signature.field("prop").to_text();
    if prop.is_empty() {
        let primary = ty
            .primary_variable
            .ok_or_else(|| format!("<{}> cannot be copied", ty.name))?;
        return Ok(vec![SerializedComponent::new(ty.copy_as).linked_to(target, primary, None)]);
    }

    let shown = type_for_kind(&signature.field("kind").to_text());
    let vars = ctx.vars_of(target).ok_or_else(|| format!("'{name}' is gone"))?;
    let address = vars
        .address(&prop)
        .ok_or_else(|| format!("'{name}' has no variable '{prop}'"))?;
    let variable = vars.name_of(address.variable).to_string();
    let shape: Vec<usize> = signature
        .field("shape")
        .as_array()
        .map(|dims| dims.iter().map(|dim| dim.to_number().max(0.0) as usize).collect())
        .unwrap_or_default();
    match address.entry {
        Some(indices) => {
            let zero_based: Vec<usize> = indices.iter().map(|index| index.saturating_sub(1)).collect();
            let key = flat_key(&shape, &zero_based).ok_or_else(|| format!("{name}.{prop} does not exist"))?;
            Ok(vec![SerializedComponent::new(shown).linked_to(target, &variable, Some(key))])
        }
        None if !shape.is_empty() => Ok((0..ArrayDef::flat_len(&shape).min(ctx.limit))
            .map(|key| SerializedComponent::new(shown).linked_to(target, &variable, Some(key)))
            .collect()),
        None => Ok(vec![SerializedComponent::new(shown).linked_to(target, &variable, None)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statevar::values::DependencyValue;

    fn numbers(pairs: &[(&'static str, f64)]) -> DependencyValues {
        let mut deps = DependencyValues::new();
        for (name, value) in pairs {
            deps.insert(
                *name,
                DependencyValue::Value {
                    value: Value::Number(*value),
                    used_default: false,
                },
            );
        }
        deps
    }

    #[test]
    fn sequence_lengths() {
        assert_eq!(sequence_length(&numbers(&[("from", 1.0), ("to", 5.0), ("step", 1.0), ("length", f64::NAN)])), 5);
        assert_eq!(sequence_length(&numbers(&[("from", 0.0), ("to", 1.0), ("step", 0.25), ("length", f64::NAN)])), 5);
        assert_eq!(sequence_length(&numbers(&[("from", 5.0), ("to", 1.0), ("step", 1.0), ("length", f64::NAN)])), 0);
        assert_eq!(sequence_length(&numbers(&[("from", 1.0), ("step", 0.0), ("length", 100.0)])), 100);
    }

    #[test]
    fn repeat_sources() {
        let list = Value::text("(1,2), (3,4)").to_math();
        assert_eq!(source_len(&list), 2);
        assert_eq!(source_entry(&list, 1).to_text(), "(3, 4)");
        assert_eq!(source_len(&Value::Number(7.0)), 1);
        assert!(source_entry(&Value::Number(7.0), 1).is_null());
    }

    #[test]
    fn kinds_pick_types() {
        assert_eq!(type_for_kind(entry_kind(&Value::array([Value::text("a")]))), "text");
        assert_eq!(type_for_kind(entry_kind(&Value::Number(1.0))), "number");
        assert_eq!(type_for_kind("record"), "math");
    }
}
