use crate::engine::arena::ComponentId;
use crate::value::Value;
use indexmap::IndexMap;

/// Which component a dependency reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentTarget {
    This,
    Parent,
    /// Nearest ancestor whose type defines the named state variable.
    AncestorWith(String),
    /// Scoped name lookup starting at the consumer.
    Named(String),
    /// The component given for an attribute, either nested or by reference.
    Attribute(String),
    /// The `index`-th active child whose type is one of `types` (any type when empty).
    Child { types: Vec<String>, index: usize },
    /// The source this component was linked to by a composite.
    Linked,
    Id(ComponentId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarSelector {
    Named(String),
    /// The target type's primary variable, or the `prop` of a reference.
    Primary,
}

impl From<&str> for VarSelector {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DependencyKind {
    StateVar {
        target: ComponentTarget,
        variable: VarSelector,
    },
    /// Length of the first dimension of an array variable.
    ArraySize {
        target: ComponentTarget,
        variable: VarSelector,
    },
    ArrayEntry {
        target: ComponentTarget,
        variable: VarSelector,
        key: usize,
    },
    /// Active children of `of` (composites replaced by their replacements),
    /// filtered by type, each with `variable` resolved when given.
    Children {
        of: ComponentTarget,
        types: Vec<String>,
        variable: Option<VarSelector>,
    },
    /// `{ type, name }` of a target without reading any of its variables.
    Identity { target: ComponentTarget },
    /// Number of replacements of a composite target, expanding it if needed.
    ReplacementCount { target: ComponentTarget },
    Constant(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub kind: DependencyKind,
    /// Unresolvable optional dependencies read as missing instead of
    /// turning the consumer into an error value.
    pub optional: bool,
}

impl Dependency {
    pub fn state_var(target: ComponentTarget, variable: impl Into<VarSelector>) -> Self {
        Self::required(DependencyKind::StateVar {
            target,
            variable: variable.into(),
        })
    }

    /// Another variable of the same component.
    pub fn own(variable: &str) -> Self {
        Self::state_var(ComponentTarget::This, variable)
    }

    /// Primary value of an attribute component. Optional, since most
    /// attributes may be left out.
    pub fn attribute(name: &str) -> Self {
        Self::state_var(ComponentTarget::Attribute(name.to_string()), VarSelector::Primary).optional()
    }

    pub fn array_size(target: ComponentTarget, variable: impl Into<VarSelector>) -> Self {
        Self::required(DependencyKind::ArraySize {
            target,
            variable: variable.into(),
        })
    }

    pub fn array_entry(target: ComponentTarget, variable: impl Into<VarSelector>, key: usize) -> Self {
        Self::required(DependencyKind::ArrayEntry {
            target,
            variable: variable.into(),
            key,
        })
    }

    pub fn children(types: &[&str], variable: Option<VarSelector>) -> Self {
        Self::required(DependencyKind::Children {
            of: ComponentTarget::This,
            types: types.iter().map(|t| t.to_string()).collect(),
            variable,
        })
    }

    pub fn identity(target: ComponentTarget) -> Self {
        Self::required(DependencyKind::Identity { target })
    }

    pub fn replacement_count(target: ComponentTarget) -> Self {
        Self::required(DependencyKind::ReplacementCount { target })
    }

    pub fn constant(value: Value) -> Self {
        Self::required(DependencyKind::Constant(value))
    }

    fn required(kind: DependencyKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Named dependencies of one node, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencySpec {
    entries: IndexMap<&'static str, Dependency>,
}

impl DependencySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, dependency: Dependency) -> Self {
        self.entries.insert(name, dependency);
        self
    }

    pub fn insert(&mut self, name: &'static str, dependency: Dependency) {
        self.entries.insert(name, dependency);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Dependency)> {
        self.entries.iter().map(|(name, dependency)| (*name, dependency))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_keeps_declaration_order() {
        let spec = DependencySpec::new()
            .with("value", Dependency::own("value"))
            .with("digits", Dependency::attribute("displayDigits"))
            .with("children", Dependency::children(&["string"], Some(VarSelector::Primary)));
        let names: Vec<_> = spec.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["value", "digits", "children"]);
        assert!(spec.iter().nth(1).is_some_and(|(_, d)| d.optional));
        assert!(!spec.iter().next().is_some_and(|(_, d)| d.optional));
    }
}
