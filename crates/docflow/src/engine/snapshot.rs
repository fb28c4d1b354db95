//! Essential-state snapshots.
//!
//! Essential values are the only per-component state an undo layer needs
//! beyond the document structure, so a snapshot is just those values keyed
//! by component name.
//!
//! Note: JSON serialization requires the `cli` feature.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EssentialSnapshot {
    /// Version for migration support
    pub version: u32,
    /// component name -> variable name -> essential value
    pub components: BTreeMap<String, BTreeMap<String, Value>>,
}

impl EssentialSnapshot {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            components: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, component: &str, variable: &str, value: Value) {
        self.components
            .entry(component.to_string())
            .or_default()
            .insert(variable.to_string(), value);
    }

    pub fn get(&self, component: &str, variable: &str) -> Option<&Value> {
        self.components.get(component)?.get(variable)
    }

    pub fn len(&self) -> usize {
        self.components.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(feature = "cli")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "cli")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_insert_get() {
        let mut snapshot = EssentialSnapshot::new();
        snapshot.insert("n", "value", Value::Number(3.0));
        snapshot.insert("n", "immediateValue", Value::text("3"));
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get("n", "value").is_some_and(|v| v.same_as(&Value::Number(3.0))));
        assert!(snapshot.get("m", "value").is_none());
    }
}
