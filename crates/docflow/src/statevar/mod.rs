//! State-variable definitions.
//!
//! Every variable is a pair of pure functions over its dependencies: a
//! definition computing the value forward, and optionally an inverse that
//! distributes a desired value back onto the dependencies. Which
//! dependencies a variable has may itself depend on "determining"
//! variables of the same component.

pub mod array;
pub mod dependency;
pub mod inverse;
pub mod values;

use crate::engine::address::VarId;
use crate::value::Value;
use array::ArrayDef;
use dependency::DependencySpec;
use inverse::{InverseContext, InverseInstruction};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use values::{DependencyValues, DeterminingValues};

pub type DependenciesFn = Arc<dyn Fn(&DeterminingValues) -> DependencySpec + Send + Sync>;
pub type DefinitionFn = Arc<dyn Fn(&DependencyValues) -> Definition + Send + Sync>;
pub type InverseFn =
    Arc<dyn Fn(&mut InverseContext<'_>) -> Result<Vec<InverseInstruction>, String> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Value),
    /// Use the essential slot if it was ever written, else `default`.
    EssentialOrDefault(Value),
    /// Use the variable's declared default.
    Default,
}

/// Result of a definition call.
#[derive(Debug, Clone)]
pub struct Definition {
    pub outcome: Outcome,
    pub warnings: Vec<String>,
}

impl Definition {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            outcome: Outcome::Value(value.into()),
            warnings: Vec::new(),
        }
    }

    pub fn essential_or(default: Value) -> Self {
        Self {
            outcome: Outcome::EssentialOrDefault(default),
            warnings: Vec::new(),
        }
    }

    pub fn use_default() -> Self {
        Self {
            outcome: Outcome::Default,
            warnings: Vec::new(),
        }
    }

    /// Record an author-facing warning alongside the value.
    pub fn warn(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(message.into());
        self
    }
}

#[derive(Clone)]
pub struct ScalarDef {
    pub dependencies: DependenciesFn,
    pub definition: DefinitionFn,
    pub inverse: Option<InverseFn>,
}

#[derive(Clone)]
pub enum VarKind {
    Scalar(ScalarDef),
    Array(ArrayDef),
}

#[derive(Clone)]
pub struct StateVarDef {
    pub name: String,
    /// Variables of the same component the dependency functions may read.
    pub determining: Vec<String>,
    pub kind: VarKind,
    pub has_essential: bool,
    pub default_value: Value,
    pub for_renderer: bool,
}

impl StateVarDef {
    pub fn scalar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            determining: Vec::new(),
            kind: VarKind::Scalar(ScalarDef {
                dependencies: Arc::new(|_| DependencySpec::new()),
                definition: Arc::new(|_| Definition::use_default()),
                inverse: None,
            }),
            has_essential: false,
            default_value: Value::Null,
            for_renderer: false,
        }
    }

    pub fn array(name: &str, array: ArrayDef) -> Self {
        Self {
            kind: VarKind::Array(array),
            ..Self::scalar(name)
        }
    }

    pub fn determined_by(mut self, names: &[&str]) -> Self {
        self.determining = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn dependencies(
        mut self,
        f: impl Fn(&DeterminingValues) -> DependencySpec + Send + Sync + 'static,
    ) -> Self {
        if let VarKind::Scalar(scalar) = &mut self.kind {
            scalar.dependencies = Arc::new(f);
        }
        self
    }

    pub fn definition(mut self, f: impl Fn(&DependencyValues) -> Definition + Send + Sync + 'static) -> Self {
        if let VarKind::Scalar(scalar) = &mut self.kind {
            scalar.definition = Arc::new(f);
        }
        self
    }

    pub fn inverse(
        mut self,
        f: impl Fn(&mut InverseContext<'_>) -> Result<Vec<InverseInstruction>, String> + Send + Sync + 'static,
    ) -> Self {
        if let VarKind::Scalar(scalar) = &mut self.kind {
            scalar.inverse = Some(Arc::new(f));
        }
        self
    }

    /// Give the variable an essential slot starting out as `default`.
    pub fn essential(mut self, default: Value) -> Self {
        self.has_essential = true;
        self.default_value = default;
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default_value = default;
        self
    }

    pub fn for_renderer(mut self) -> Self {
        self.for_renderer = true;
        self
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, VarKind::Array(_))
    }

    pub fn as_array(&self) -> Option<&ArrayDef> {
        match &self.kind {
            VarKind::Array(array) => Some(array),
            VarKind::Scalar(_) => None,
        }
    }
}

/// The state variables of one component, addressable by `VarId`.
#[derive(Clone, Default)]
pub struct VarTable {
    defs: Vec<Arc<StateVarDef>>,
    by_name: FxHashMap<String, VarId>,
}

/// A variable name resolved against a table, possibly naming one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VarAddress {
    pub variable: VarId,
    /// 1-based indices when the name was an entry alias such as `x2`.
    pub entry: Option<Vec<usize>>,
}

impl VarTable {
    pub fn new(defs: impl IntoIterator<Item = StateVarDef>) -> Self {
        let mut table = Self::default();
        for def in defs {
            table.push(def);
        }
        table
    }

    /// Adds a definition, replacing an earlier one of the same name.
    pub fn push(&mut self, def: StateVarDef) {
        if let Some(id) = self.by_name.get(&def.name) {
            self.defs[id.0 as usize] = Arc::new(def);
            return;
        }
        let id = VarId(self.defs.len() as u16);
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(Arc::new(def));
    }

    pub fn get(&self, id: VarId) -> Option<&Arc<StateVarDef>> {
        self.defs.get(id.0 as usize)
    }

    pub fn id_of(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: VarId) -> &str {
        self.get(id).map_or("?", |def| def.name.as_str())
    }

    /// Resolves a plain name or an array entry alias.
    pub fn address(&self, name: &str) -> Option<VarAddress> {
        if let Some(variable) = self.id_of(name) {
            return Some(VarAddress {
                variable,
                entry: None,
            });
        }
        self.defs.iter().enumerate().find_map(|(index, def)| {
            let indices = def.as_array()?.parse_entry_name(name)?;
            Some(VarAddress {
                variable: VarId(index as u16),
                entry: Some(indices),
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Arc<StateVarDef>)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(index, def)| (VarId(index as u16), def))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_replaces_by_name() {
        let mut table = VarTable::new([
            StateVarDef::scalar("value").essential(Value::Number(0.0)),
            StateVarDef::scalar("text"),
        ]);
        table.push(StateVarDef::scalar("value"));
        assert_eq!(table.len(), 2);
        let value = table.id_of("value").unwrap();
        assert!(!table.get(value).unwrap().has_essential);
        assert_eq!(table.name_of(value), "value");
    }

    #[test]
    fn addresses_entry_aliases() {
        let table = VarTable::new([
            StateVarDef::scalar("coords"),
            StateVarDef::array("xs", ArrayDef::new(1).entry_prefix("x")),
        ]);
        assert_eq!(
            table.address("x2"),
            Some(VarAddress {
                variable: VarId(1),
                entry: Some(vec![2]),
            })
        );
        assert_eq!(table.address("coords").and_then(|a| a.entry), None);
        assert_eq!(table.address("y1"), None);
    }
}
