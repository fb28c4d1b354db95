use super::ComponentType;
use super::basic::{children_text, display_attributes, display_policy, invert_through_children, text_children, with_display};
use crate::component::attributes::AttributeSchema;
use crate::config::CoreConfig;
use crate::statevar::dependency::{Dependency, DependencySpec};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;
use docflow_expr::Expr;

pub struct NumberComponent;

impl ComponentType for NumberComponent {
    fn name(&self) -> &'static str {
        "number"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        display_attributes()
    }

    fn state_variables(&self, config: &CoreConfig) -> Vec<StateVarDef> {
        let rounding = config.rounding.clone();
        vec![
            StateVarDef::scalar("value")
                .essential(Value::Number(f64::NAN))
                .for_renderer()
                .dependencies(|_| DependencySpec::new().with("children", text_children()))
                .definition(|deps| {
                    if deps.children("children").is_empty() {
                        return Definition::essential_or(Value::Number(f64::NAN));
                    }
                    Definition::value(Value::text(children_text(deps)).to_number())
                })
                .inverse(|ctx| {
                    let number = ctx.desired.to_number();
                    if number.is_nan() && !ctx.desired.to_text().eq_ignore_ascii_case("nan") {
                        return Err(format!("'{}' is not a number", ctx.desired));
                    }
                    let text = Value::Number(number).to_text();
                    invert_through_children(ctx.dependencies, Value::Number(number), text)
                }),
            StateVarDef::scalar("isInteger")
                .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
                .definition(|deps| {
                    let value = deps.number("value");
                    Definition::value(value.is_finite() && value.fract() == 0.0)
                }),
            StateVarDef::scalar("text")
                .for_renderer()
                .dependencies(|_| with_display(DependencySpec::new().with("value", Dependency::own("value"))))
                .definition(move |deps| {
                    let policy = display_policy(deps, &rounding);
                    Definition::value(Value::text(policy.format(deps.number("value"))))
                })
                .inverse(|ctx| Ok(vec![InverseInstruction::dependency("value", ctx.desired.clone())])),
        ]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }
}

pub struct MathComponent;

impl ComponentType for MathComponent {
    fn name(&self) -> &'static str {
        "math"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        display_attributes()
    }

    fn state_variables(&self, config: &CoreConfig) -> Vec<StateVarDef> {
        let rounding = config.rounding.clone();
        let blank = Value::Null.to_math();
        let default = blank.clone();
        vec![
            StateVarDef::scalar("value")
                .essential(blank)
                .for_renderer()
                .dependencies(|_| DependencySpec::new().with("children", text_children()))
                .definition(move |deps| {
                    if deps.children("children").is_empty() {
                        return Definition::essential_or(default.clone());
                    }
                    let source = children_text(deps);
                    match Value::text(source.as_str()).to_math() {
                        Value::Error(message) => Definition::value(Value::Error(message.clone())).warn(message.to_string()),
                        math => Definition::value(math),
                    }
                })
                .inverse(|ctx| {
                    let math = ctx.desired.to_math();
                    if let Value::Error(message) = &math {
                        return Err(message.to_string());
                    }
                    let text = math.to_text();
                    invert_through_children(ctx.dependencies, math, text)
                }),
            StateVarDef::scalar("number")
                .dependencies(|_| DependencySpec::new().with("value", Dependency::own("value")))
                .definition(|deps| Definition::value(deps.number("value")))
                .inverse(|ctx| {
                    Ok(vec![InverseInstruction::dependency(
                        "value",
                        Value::math(Expr::Number(ctx.desired.to_number())),
                    )])
                }),
            StateVarDef::scalar("text")
                .for_renderer()
                .dependencies(|_| with_display(DependencySpec::new().with("value", Dependency::own("value"))))
                .definition(move |deps| {
                    let text = match deps.value("value").as_math() {
                        Some(Expr::Number(number)) => display_policy(deps, &rounding).format(*number),
                        _ => deps.value("value").to_text(),
                    };
                    Definition::value(Value::text(text))
                })
                .inverse(|ctx| Ok(vec![InverseInstruction::dependency("value", ctx.desired.clone())])),
        ]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("value")
    }
}
