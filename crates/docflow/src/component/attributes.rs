//! Attribute schemas and the state variables generated from them.

use crate::statevar::dependency::{ComponentTarget, Dependency, DependencySpec};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Bool,
    Number,
    Text,
    Math,
    /// Must name another component; never a primitive.
    Reference,
}

impl AttributeKind {
    /// Coerce a value into the attribute's kind.
    pub fn convert(self, value: &Value) -> Value {
        match self {
            Self::Bool => match value.to_boolean() {
                Some(flag) => Value::Bool(flag),
                None if value.is_error() => value.clone(),
                None => Value::error(format!("expected a boolean, found '{value}'")),
            },
            Self::Number => match value {
                Value::Error(_) => value.clone(),
                Value::Text(text) => match docflow_expr::parse(text.trim()) {
                    Ok(expr) => Value::Number(expr.evaluate_to_constant().unwrap_or(f64::NAN)),
                    Err(_) => Value::error(format!("invalid number '{text}'")),
                },
                other => Value::Number(other.to_number()),
            },
            Self::Text => match value {
                Value::Error(_) | Value::Text(_) => value.clone(),
                other => Value::text(other.to_text()),
            },
            Self::Math => value.to_math(),
            Self::Reference => value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: &'static str,
    /// Name of the generated state variable; the attribute name unless
    /// the type needs that name for something else.
    pub variable: &'static str,
    pub kind: AttributeKind,
    pub default: Value,
    /// Fall back to the nearest ancestor's variable of the same name.
    pub inherit: bool,
    pub creates_state_variable: bool,
    pub for_renderer: bool,
}

impl AttributeSchema {
    fn new(name: &'static str, kind: AttributeKind, default: Value) -> Self {
        Self {
            name,
            variable: name,
            kind,
            default,
            inherit: false,
            creates_state_variable: kind != AttributeKind::Reference,
            for_renderer: false,
        }
    }

    pub fn boolean(name: &'static str, default: bool) -> Self {
        Self::new(name, AttributeKind::Bool, Value::Bool(default))
    }

    pub fn number(name: &'static str, default: Value) -> Self {
        Self::new(name, AttributeKind::Number, default)
    }

    pub fn text(name: &'static str, default: &str) -> Self {
        Self::new(name, AttributeKind::Text, Value::text(default))
    }

    pub fn math(name: &'static str, default: Value) -> Self {
        Self::new(name, AttributeKind::Math, default)
    }

    pub fn reference(name: &'static str) -> Self {
        Self::new(name, AttributeKind::Reference, Value::Null)
    }

    pub fn inherit(mut self) -> Self {
        self.inherit = true;
        self
    }

    /// The component reads the attribute through its own dependencies.
    pub fn no_state_variable(mut self) -> Self {
        self.creates_state_variable = false;
        self
    }

    pub fn for_renderer(mut self) -> Self {
        self.for_renderer = true;
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn stored_as(mut self, variable: &'static str) -> Self {
        self.variable = variable;
        self
    }

    /// The generated state variable: the attribute component's value when
    /// one is given, else the essential slot the primitive was written to,
    /// else the inherited or declared default.
    pub fn state_variable(&self) -> StateVarDef {
        let name = self.name;
        let variable = self.variable;
        let kind = self.kind;
        let inherit = self.inherit;
        let default = self.default.clone();

        let mut def = StateVarDef::scalar(variable)
            .essential(self.default.clone())
            .dependencies(move |_| {
                let mut spec = DependencySpec::new().with("attribute", Dependency::attribute(name));
                if inherit {
                    spec.insert(
                        "ancestor",
                        Dependency::state_var(ComponentTarget::AncestorWith(variable.to_string()), variable).optional(),
                    );
                }
                spec
            })
            .definition(move |deps| {
                if deps.is_present("attribute") {
                    return Definition::value(kind.convert(deps.value("attribute")));
                }
                if deps.is_present("ancestor") {
                    return Definition::essential_or(deps.value("ancestor").clone());
                }
                Definition::essential_or(default.clone())
            })
            .inverse(move |ctx| {
                let desired = kind.convert(ctx.desired);
                if desired.is_error() {
                    return Err(format!("'{}' is not a valid {name}", ctx.desired));
                }
                if ctx.dependencies.is_present("attribute") {
                    Ok(vec![InverseInstruction::dependency("attribute", desired)])
                } else {
                    Ok(vec![InverseInstruction::SetEssential(desired)])
                }
            });
        if self.for_renderer {
            def = def.for_renderer();
        }
        def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_conversion() {
        let number = AttributeKind::Number;
        assert!(number.convert(&Value::text("37/3")).same_as(&Value::Number(37.0 / 3.0)));
        assert!(number.convert(&Value::text("a+")).is_error());
        assert!(number.convert(&Value::text("x")).same_as(&Value::Number(f64::NAN)));
    }

    #[test]
    fn boolean_conversion() {
        assert!(AttributeKind::Bool.convert(&Value::text("")).same_as(&Value::Bool(true)));
        assert!(AttributeKind::Bool.convert(&Value::text("maybe")).is_error());
    }

    #[test]
    fn generated_variable_is_essential() {
        let def = AttributeSchema::number("displayDigits", Value::Number(10.0))
            .inherit()
            .state_variable();
        assert!(def.has_essential);
        assert_eq!(def.name, "displayDigits");
        assert!(!def.for_renderer);
    }

    #[test]
    fn stored_under_another_name() {
        let schema = AttributeSchema::math("vertices", Value::Null).stored_as("specifiedVertices");
        assert_eq!(schema.name, "vertices");
        assert_eq!(schema.state_variable().name, "specifiedVertices");
    }
}
