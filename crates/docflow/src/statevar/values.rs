use crate::engine::address::NodeKey;
use crate::engine::arena::ComponentId;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ChildValue {
    pub component: ComponentId,
    pub component_type: Arc<str>,
    /// `Null` when the dependency did not ask for a variable.
    pub value: Value,
}

#[derive(Debug, Clone)]
pub enum DependencyValue {
    Value {
        value: Value,
        /// The producer fell back to its default rather than a supplied value.
        used_default: bool,
    },
    Children(Vec<ChildValue>),
    Missing,
}

/// Resolved dependency values handed to a definition.
#[derive(Debug, Clone, Default)]
pub struct DependencyValues {
    entries: IndexMap<&'static str, DependencyValue>,
}

static NULL: Value = Value::Null;

impl DependencyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, value: DependencyValue) {
        self.entries.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&DependencyValue> {
        self.entries.get(name)
    }

    /// Scalar value of a dependency; `Null` when missing or a child list.
    pub fn value(&self, name: &str) -> &Value {
        match self.entries.get(name) {
            Some(DependencyValue::Value { value, .. }) => value,
            _ => &NULL,
        }
    }

    pub fn number(&self, name: &str) -> f64 {
        self.value(name).to_number()
    }

    /// Shape delivered by an array-size dependency.
    pub fn shape(&self, name: &str) -> Vec<usize> {
        self.value(name)
            .as_array()
            .map(|dims| {
                dims.iter()
                    .map(|dim| dim.to_number().max(0.0) as usize)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Length of the first dimension of an array-size dependency.
    pub fn array_len(&self, name: &str) -> usize {
        self.shape(name).first().copied().unwrap_or(0)
    }

    pub fn is_present(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(DependencyValue::Value { .. }))
    }

    /// Present and not just the producer's default.
    pub fn is_supplied(&self, name: &str) -> bool {
        matches!(
            self.entries.get(name),
            Some(DependencyValue::Value {
                used_default: false,
                ..
            })
        )
    }

    pub fn children(&self, name: &str) -> &[ChildValue] {
        match self.entries.get(name) {
            Some(DependencyValue::Children(children)) => children,
            _ => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DependencyValue)> {
        self.entries.iter().map(|(name, value)| (*name, value))
    }
}

/// Current values of the variables a dependency specification is allowed
/// to look at.
#[derive(Debug, Clone, Default)]
pub struct DeterminingValues {
    values: IndexMap<String, Value>,
}

impl DeterminingValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn same_as(&self, other: &DeterminingValues) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
    }
}

/// Where a dependency's value came from, kept so inversion can route a
/// desired value back to the producer.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Node(NodeKey),
    Children(Vec<(ComponentId, Option<NodeKey>)>),
    Unbound,
}

/// Dependency values of a node together with their bindings.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedInputs {
    pub values: DependencyValues,
    pub bindings: FxHashMap<&'static str, Binding>,
}

impl ResolvedInputs {
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reads_as_null() {
        let mut values = DependencyValues::new();
        values.insert("a", DependencyValue::Missing);
        values.insert(
            "b",
            DependencyValue::Value {
                value: Value::Number(2.0),
                used_default: true,
            },
        );
        assert!(values.value("a").is_null());
        assert!(values.value("nope").is_null());
        assert!(values.is_present("b"));
        assert!(!values.is_supplied("b"));
        assert_eq!(values.number("b"), 2.0);
        assert!(values.children("b").is_empty());
    }

    #[test]
    fn determining_values_compare_structurally() {
        let mut a = DeterminingValues::new();
        a.insert("n", Value::Number(f64::NAN));
        let mut b = DeterminingValues::new();
        b.insert("n", Value::Number(f64::NAN));
        assert!(a.same_as(&b));
        b.insert("m", Value::Null);
        assert!(!a.same_as(&b));
    }
}
