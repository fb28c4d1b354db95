use docflow_expr::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved state-variable value.
///
/// `Null` means "no value" (a missing optional dependency, an array key past
/// the end). `Error` is the sentinel a component resolves to when its
/// configuration is broken; it flows through definitions like any value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Math(Arc<Expr>),
    Array(Arc<Vec<Value>>),
    Record(Arc<BTreeMap<String, Value>>),
    Error(Arc<str>),
}

impl Value {
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    pub fn math(expr: Expr) -> Self {
        Self::Math(Arc::new(expr))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn record(fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Record(Arc::new(fields.into_iter().collect()))
    }

    pub fn error(message: impl Into<Arc<str>>) -> Self {
        Self::Error(message.into())
    }

    /// Structural equality used for actual-change suppression.
    /// Unlike `==` on floats, NaN is the same as NaN.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Math(a), Self::Math(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Array(a), Self::Array(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.same_as(b)))
            }
            (Self::Record(a), Self::Record(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb)))
            }
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Math(_) => "math",
            Self::Array(_) => "array",
            Self::Record(_) => "record",
            Self::Error(_) => "error",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_math(&self) -> Option<&Expr> {
        match self {
            Self::Math(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> &Value {
        self.as_record()
            .and_then(|fields| fields.get(name))
            .unwrap_or(&NULL)
    }

    /// Numeric reading of any value; NaN when there is none.
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Math(expr) => expr.evaluate_to_constant().unwrap_or(f64::NAN),
            Self::Text(text) => docflow_expr::parse(text.trim())
                .ok()
                .and_then(|expr| expr.evaluate_to_constant())
                .unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Math reading of any value. Text that does not parse becomes `Error`.
    pub fn to_math(&self) -> Value {
        match self {
            Self::Math(_) | Self::Error(_) => self.clone(),
            Self::Number(value) => Self::math(Expr::Number(*value)),
            Self::Text(text) if text.trim().is_empty() => Self::math(Expr::Symbol("\u{ff3f}".into())),
            Self::Text(text) => match docflow_expr::parse(text.trim()) {
                Ok(expr) => Self::math(expr),
                Err(_) => Self::error(format!("invalid math '{text}'")),
            },
            Self::Array(items) => {
                let mut components = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item.to_math() {
                        Self::Math(expr) => components.push(Arc::unwrap_or_clone(expr)),
                        other => return other,
                    }
                }
                Self::math(Expr::Tuple(components))
            }
            Self::Null => Self::math(Expr::Symbol("\u{ff3f}".into())),
            Self::Bool(_) | Self::Record(_) => {
                Self::error(format!("cannot use {} as math", self.kind_name()))
            }
        }
    }

    pub fn to_boolean(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Number(value) => Some(*value != 0.0),
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Display text; numbers use the shortest exact form.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

static NULL: Value = Value::Null;

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{}", format_number(*value)),
            Self::Text(text) => write!(f, "{text}"),
            Self::Math(expr) => write!(f, "{expr}"),
            Self::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (index, (name, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Error(message) => write!(f, "\u{fffd}{message}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        Self::math(expr)
    }
}

#[cfg(feature = "cli")]
impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => json!(value),
            Self::Number(value) if value.is_finite() => json!(value),
            Self::Number(value) => json!(format_number(*value)),
            Self::Text(text) => json!(text.as_ref()),
            Self::Math(expr) => json!({ "math": expr.to_string() }),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Error(message) => json!({ "error": message.as_ref() }),
        }
    }

    /// Inverse of `to_json` for values a script can write. `{"math": ".."}`
    /// is parsed as an expression.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Self::text(text.as_str()),
            serde_json::Value::Array(items) => Self::array(items.iter().map(Self::from_json)),
            serde_json::Value::Object(fields) => {
                if let (1, Some(serde_json::Value::String(source))) = (fields.len(), fields.get("math")) {
                    return Self::text(source.as_str()).to_math();
                }
                Self::record(
                    fields
                        .iter()
                        .map(|(name, value)| (name.clone(), Self::from_json(value))),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_same_as_nan() {
        assert!(Value::Number(f64::NAN).same_as(&Value::Number(f64::NAN)));
        assert!(!Value::Number(1.0).same_as(&Value::Number(f64::NAN)));
        let a = Value::array([Value::Number(f64::NAN), Value::text("a")]);
        let b = Value::array([Value::Number(f64::NAN), Value::text("a")]);
        assert!(a.same_as(&b));
    }

    #[test]
    fn different_kinds_differ() {
        assert!(!Value::Number(1.0).same_as(&Value::text("1")));
        assert!(!Value::Null.same_as(&Value::Bool(false)));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::text("36/3").to_number(), 12.0);
        assert!(Value::text("abc(").to_math().is_error());
        assert_eq!(Value::text("false").to_boolean(), Some(false));
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Number(3.0).to_text(), "3");
        let tuple = Value::array([Value::Number(1.0), Value::Number(2.0)]).to_math();
        assert_eq!(tuple.to_text(), "(1, 2)");
    }
}
