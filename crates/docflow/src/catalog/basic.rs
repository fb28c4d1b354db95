//! Containers and the plain text-like types.

use super::ComponentType;
use crate::component::attributes::AttributeSchema;
use crate::config::{CoreConfig, RoundingConfig};
use crate::rounding::{RoundingPolicy, policy_for};
use crate::statevar::dependency::{Dependency, DependencySpec, VarSelector};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::values::DependencyValues;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;

/// Display settings every number-showing type and every container carries,
/// so that a setting on a section reaches everything inside it.
pub(super) fn display_attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::number("displayDigits", Value::Null).inherit(),
        AttributeSchema::number("displayDecimals", Value::Null).inherit(),
        AttributeSchema::boolean("padZeros", false)
            .default_value(Value::Null)
            .inherit(),
    ]
}

/// Own display settings as dependencies, named after the variables.
pub(super) fn with_display(spec: DependencySpec) -> DependencySpec {
    spec.with("displayDigits", Dependency::own("displayDigits"))
        .with("displayDecimals", Dependency::own("displayDecimals"))
        .with("padZeros", Dependency::own("padZeros"))
}

/// Rounding for resolved display settings; unset ones fall back to the
/// document configuration.
pub(super) fn display_policy(deps: &DependencyValues, config: &RoundingConfig) -> Box<dyn RoundingPolicy> {
    let setting = |name: &str| {
        deps.value(name)
            .as_number()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value as u32)
    };
    let digits = setting("displayDigits").unwrap_or(config.display_digits);
    let decimals = setting("displayDecimals").or(config.display_decimals);
    let pad_zeros = deps.value("padZeros").as_bool().unwrap_or(config.pad_zeros);
    policy_for(Some(digits), decimals, pad_zeros)
}

/// Concatenated `text` of the active children.
pub(super) fn children_text(deps: &DependencyValues) -> String {
    deps.children("children")
        .iter()
        .map(|child| child.value.to_text())
        .collect()
}

pub(super) fn text_children() -> Dependency {
    Dependency::children(&[], Some(VarSelector::Named("text".to_string())))
}

/// Inverse shared by types whose value is parsed from their children:
/// the essential slot when there are none, the only child when there is
/// one, a rejection otherwise.
pub(super) fn invert_through_children(
    deps: &DependencyValues,
    essential: Value,
    as_text: String,
) -> Result<Vec<InverseInstruction>, String> {
    match deps.children("children").len() {
        0 => Ok(vec![InverseInstruction::SetEssential(essential)]),
        1 => Ok(vec![InverseInstruction::child("children", 0, Value::text(as_text))]),
        count => Err(format!("value is made of {count} children")),
    }
}

/// `document`, `section`, `group`: hold children and pass display
/// settings down.
pub struct Container {
    name: &'static str,
}

impl Container {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ComponentType for Container {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        display_attributes()
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("numChildren")
                .dependencies(|_| DependencySpec::new().with("children", Dependency::children(&[], None)))
                .definition(|deps| Definition::value(deps.children("children").len() as f64)),
        ]
    }
}

pub struct StringComponent;

impl ComponentType for StringComponent {
    fn name(&self) -> &'static str {
        "string"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("value")
                .essential(Value::text(""))
                .for_renderer()
                .definition(|_| Definition::essential_or(Value::text(""))),
            StateVarDef::scalar("text")
                .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
                .definition(|deps| Definition::value(Value::text(deps.value("value").to_text())))
                .inverse(|ctx| {
                    Ok(vec![InverseInstruction::dependency(
                        "value",
                        Value::text(ctx.desired.to_text()),
                    )])
                }),
        ]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }
}

pub struct TextComponent;

impl ComponentType for TextComponent {
    fn name(&self) -> &'static str {
        "text"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("value")
                .essential(Value::text(""))
                .for_renderer()
                .dependencies(|_| DependencySpec::new().with("children", text_children()))
                .definition(|deps| {
                    if deps.children("children").is_empty() {
                        return Definition::essential_or(Value::text(""));
                    }
                    Definition::value(Value::text(children_text(deps)))
                })
                .inverse(|ctx| {
                    let text = ctx.desired.to_text();
                    invert_through_children(ctx.dependencies, Value::text(text.as_str()), text)
                }),
            StateVarDef::scalar("text")
                .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
                .definition(|deps| Definition::value(deps.value("value").clone()))
                .inverse(|ctx| Ok(vec![InverseInstruction::dependency("value", ctx.desired.clone())])),
        ]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }
}

pub struct BooleanComponent;

impl ComponentType for BooleanComponent {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        vec![
            StateVarDef::scalar("value")
                .essential(Value::Bool(false))
                .for_renderer()
                .dependencies(|_| DependencySpec::new().with("children", text_children()))
                .definition(|deps| {
                    if deps.children("children").is_empty() {
                        return Definition::essential_or(Value::Bool(false));
                    }
                    let text = children_text(deps);
                    match Value::text(text.as_str()).to_boolean() {
                        Some(flag) => Definition::value(flag),
                        None => Definition::value(false).warn(format!("'{text}' is not a boolean")),
                    }
                })
                .inverse(|ctx| {
                    let flag = ctx
                        .desired
                        .to_boolean()
                        .ok_or_else(|| format!("'{}' is not a boolean", ctx.desired))?;
                    invert_through_children(ctx.dependencies, Value::Bool(flag), flag.to_string())
                }),
            StateVarDef::scalar("text")
                .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
                .definition(|deps| Definition::value(Value::text(deps.value("value").to_text())))
                .inverse(|ctx| Ok(vec![InverseInstruction::dependency("value", ctx.desired.clone())])),
        ]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statevar::values::DependencyValue;

    fn settings(digits: Value, decimals: Value) -> DependencyValues {
        let mut deps = DependencyValues::new();
        for (name, value) in [("displayDigits", digits), ("displayDecimals", decimals)] {
            deps.insert(
                name,
                DependencyValue::Value {
                    value,
                    used_default: false,
                },
            );
        }
        deps.insert("padZeros", DependencyValue::Missing);
        deps
    }

    #[test]
    fn unset_settings_use_the_configuration() {
        let config = RoundingConfig {
            display_digits: 3,
            ..RoundingConfig::default()
        };
        let policy = display_policy(&settings(Value::Null, Value::Null), &config);
        assert_eq!(policy.format(37.0 / 3.0), "12.3");
    }

    #[test]
    fn decimals_override_digits() {
        let policy = display_policy(
            &settings(Value::Number(3.0), Value::Number(1.0)),
            &RoundingConfig::default(),
        );
        assert_eq!(policy.format(2.25), "2.3");
    }

    #[test]
    fn many_children_are_not_invertible() {
        let deps = DependencyValues::new();
        let instructions = invert_through_children(&deps, Value::text("x"), "x".to_string()).unwrap();
        assert_eq!(instructions, vec![InverseInstruction::SetEssential(Value::text("x"))]);
    }
}
