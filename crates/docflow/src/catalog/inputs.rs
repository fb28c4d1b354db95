//! Inputs: a committed `value` plus the `immediateValue` being typed.
//!
//! `immediateValue` is stored as the typed text together with the value it
//! was typed over. When `value` moves on without the edit being committed,
//! the stale edit is ignored and `immediateValue` follows `value` again.

use super::{ActionDef, ActionPlan, ChainStep, ComponentType};
use crate::component::attributes::AttributeSchema;
use crate::config::CoreConfig;
use crate::statevar::dependency::{Dependency, DependencySpec};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;

type Convert = fn(&Value) -> Value;

fn to_text(value: &Value) -> Value {
    match value {
        Value::Text(_) | Value::Error(_) => value.clone(),
        other => Value::text(other.to_text()),
    }
}

fn to_math(value: &Value) -> Value {
    value.to_math()
}

fn input_variables(convert: Convert) -> Vec<StateVarDef> {
    let empty = convert(&Value::Null);
    vec![
        StateVarDef::scalar("value")
            .essential(empty.clone())
            .for_renderer()
            .dependencies(|_| {
                DependencySpec::new()
                    .with("bound", Dependency::attribute("bindValueTo"))
                    .with("prefill", Dependency::own("prefill"))
            })
            .definition(move |deps| {
                if deps.is_present("bound") {
                    return Definition::value(convert(deps.value("bound")));
                }
                Definition::essential_or(convert(deps.value("prefill")))
            })
            .inverse(move |ctx| {
                let desired = convert(ctx.desired);
                if let Value::Error(message) = &desired {
                    return Err(message.to_string());
                }
                if ctx.dependencies.is_present("bound") {
                    Ok(vec![InverseInstruction::dependency("bound", desired)])
                } else {
                    Ok(vec![InverseInstruction::SetEssential(desired)])
                }
            }),
        StateVarDef::scalar("immediateEdit")
            .essential(Value::Null)
            .definition(|_| Definition::essential_or(Value::Null)),
        StateVarDef::scalar("immediateValue")
            .for_renderer()
            .dependencies(|_| {
                DependencySpec::new()
                    .with("value", Dependency::own("value"))
                    .with("edit", Dependency::own("immediateEdit"))
            })
            .definition(|deps| {
                let value = deps.value("value");
                let edit = deps.value("edit");
                if !edit.field("typed").is_null() && edit.field("base").same_as(value) {
                    return Definition::value(edit.field("typed").clone());
                }
                Definition::value(value.clone())
            })
            .inverse(move |ctx| {
                let edit = Value::record([
                    ("typed".to_string(), convert(ctx.desired)),
                    ("base".to_string(), ctx.dependencies.value("value").clone()),
                ]);
                Ok(vec![InverseInstruction::dependency("edit", edit)])
            }),
        StateVarDef::scalar("text")
            .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
            .definition(|deps| Definition::value(Value::text(deps.value("value").to_text()))),
    ]
}

/// `updateImmediateValue` takes the typed text either bare or as `{ text }`.
fn typed(args: &Value) -> Value {
    match args.field("text") {
        Value::Null => args.clone(),
        text => text.clone(),
    }
}

fn input_actions(convert: Convert) -> Vec<ActionDef> {
    vec![
        ActionDef::new("updateImmediateValue", &[], move |ctx| {
            let desired = convert(&typed(ctx.args));
            if let Value::Error(message) = &desired {
                return Err(message.to_string());
            }
            Ok(ActionPlan {
                requests: vec![ctx.request("immediateValue", desired)],
                chain: Vec::new(),
                transient: Some(true),
            })
        }),
        ActionDef::new("updateValue", &["immediateValue", "value"], |ctx| {
            let immediate = ctx.read("immediateValue");
            if immediate.same_as(&ctx.read("value")) {
                return Ok(ActionPlan::default());
            }
            Ok(ActionPlan {
                requests: vec![ctx.request("value", immediate)],
                chain: vec![ChainStep {
                    target: (ctx.component, "immediateValue".to_string()),
                    source: (ctx.component, "value".to_string()),
                }],
                transient: Some(false),
            })
        }),
    ]
}

pub struct TextInput;

impl ComponentType for TextInput {
    fn name(&self) -> &'static str {
        "textInput"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![
            AttributeSchema::text("prefill", ""),
            AttributeSchema::reference("bindValueTo"),
        ]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        input_variables(to_text)
    }

    fn actions(&self) -> Vec<ActionDef> {
        input_actions(to_text)
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }

    fn copy_as(&self) -> &'static str {
        "text"
    }
}

pub struct MathInput;

impl ComponentType for MathInput {
    fn name(&self) -> &'static str {
        "mathInput"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![
            AttributeSchema::math("prefill", Value::Null.to_math()),
            AttributeSchema::reference("bindValueTo"),
        ]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        input_variables(to_math)
    }

    fn actions(&self) -> Vec<ActionDef> {
        input_actions(to_math)
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }

    fn copy_as(&self) -> &'static str {
        "math"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_text_bare_or_in_a_record() {
        assert!(typed(&Value::text("abc")).same_as(&Value::text("abc")));
        let record = Value::record([("text".to_string(), Value::text("x"))]);
        assert!(typed(&record).same_as(&Value::text("x")));
    }

    #[test]
    fn text_inputs_keep_text() {
        assert!(to_text(&Value::Number(2.0)).same_as(&Value::text("2")));
        assert!(to_math(&Value::text("1+")).is_error());
    }
}
