use super::values::{DependencyValues, ResolvedInputs};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One step of an inverse definition's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum InverseInstruction {
    /// Ask the producer behind a named dependency to take `desired`.
    SetDependency {
        dependency: &'static str,
        desired: Value,
        /// Array key whose per-key dependencies hold `dependency`.
        key: Option<usize>,
        /// Position within a child-list dependency.
        child: Option<usize>,
    },
    /// Write this variable's own essential slot.
    SetEssential(Value),
    /// Write entries of this array variable's essential slot.
    SetEssentialEntries(BTreeMap<usize, Value>),
}

impl InverseInstruction {
    pub fn dependency(dependency: &'static str, desired: Value) -> Self {
        Self::SetDependency {
            dependency,
            desired,
            key: None,
            child: None,
        }
    }

    pub fn child(dependency: &'static str, index: usize, desired: Value) -> Self {
        Self::SetDependency {
            dependency,
            desired,
            key: None,
            child: Some(index),
        }
    }

    pub fn keyed(dependency: &'static str, key: usize, desired: Value) -> Self {
        Self::SetDependency {
            dependency,
            desired,
            key: Some(key),
            child: None,
        }
    }
}

/// Scratch area scoped to one action.
///
/// For array variables the engine keeps the union of every key requested
/// during the action here, so a later request for another key sees the
/// earlier ones and produces one coherent update.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub(crate) desired: BTreeMap<usize, Value>,
    scratch: IndexMap<String, Value>,
}

impl Workspace {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scratch.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.scratch.insert(name.into(), value);
    }

    /// All keys desired so far in this action.
    pub fn desired_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.desired.keys().copied()
    }

    pub(crate) fn merge_desired(&mut self, entries: BTreeMap<usize, Value>) -> BTreeMap<usize, Value> {
        self.desired.extend(entries);
        self.desired.clone()
    }
}

pub struct InverseContext<'a> {
    pub desired: &'a Value,
    pub current: &'a Value,
    pub dependencies: &'a DependencyValues,
    pub workspace: &'a mut Workspace,
}

pub struct ArrayInverseContext<'a> {
    /// Desired values by flat key, merged over the whole action.
    pub desired: &'a BTreeMap<usize, Value>,
    /// Current flat entries.
    pub current: &'a [Value],
    pub shape: &'a [usize],
    pub global: &'a DependencyValues,
    pub workspace: &'a mut Workspace,
    pub(crate) by_key: &'a BTreeMap<usize, Arc<ResolvedInputs>>,
}

impl ArrayInverseContext<'_> {
    /// Per-key dependency values of a desired key.
    pub fn key_dependencies(&self, key: usize) -> Option<&DependencyValues> {
        self.by_key.get(&key).map(|inputs| &inputs.values)
    }

    /// Desired value for `key` when given, else its current value.
    pub fn merged(&self, key: usize) -> Value {
        self.desired
            .get(&key)
            .or_else(|| self.current.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_merges_keys_across_requests() {
        let mut workspace = Workspace::default();
        workspace.merge_desired(BTreeMap::from([(0, Value::Number(1.0))]));
        let merged = workspace.merge_desired(BTreeMap::from([(3, Value::Number(2.0))]));
        assert_eq!(merged.len(), 2);
        assert_eq!(workspace.desired_keys().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn merged_prefers_desired() {
        let mut workspace = Workspace::default();
        let desired = BTreeMap::from([(1, Value::Number(9.0))]);
        let current = [Value::Number(1.0), Value::Number(2.0)];
        let by_key = BTreeMap::new();
        let global = DependencyValues::new();
        let context = ArrayInverseContext {
            desired: &desired,
            current: &current,
            shape: &[2],
            global: &global,
            workspace: &mut workspace,
            by_key: &by_key,
        };
        assert!(context.merged(0).same_as(&Value::Number(1.0)));
        assert!(context.merged(1).same_as(&Value::Number(9.0)));
        assert!(context.merged(5).is_null());
    }
}
