//! Composites: components that stand in for a generated list of
//! replacements.
//!
//! A composite names one sentinel state variable. Its replacements are
//! recomputed only when the sentinel actually changes, and only the
//! positions whose serialized form changed are torn down and rebuilt.

mod diff;
mod expander;

pub use diff::{ReplacementChange, calculate_replacement_changes};

use crate::catalog::TypeInfo;
use crate::component::serialized::{SerializedComponent, SerializedNode};
use crate::document::DocumentCore;
use crate::engine::arena::ComponentId;
use crate::statevar::VarTable;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

pub type CreateReplacementsFn =
    Arc<dyn Fn(&ExpansionContext<'_>) -> Result<Vec<SerializedComponent>, String> + Send + Sync>;

#[derive(Clone)]
pub struct CompositeDef {
    /// State variable whose change triggers re-expansion.
    pub sentinel: &'static str,
    /// Further own variables handed to `create`. Changes to them alone do
    /// not re-expand.
    pub reads: Vec<&'static str>,
    pub create: CreateReplacementsFn,
}

impl CompositeDef {
    pub fn new(
        sentinel: &'static str,
        reads: &[&'static str],
        create: impl Fn(&ExpansionContext<'_>) -> Result<Vec<SerializedComponent>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sentinel,
            reads: reads.to_vec(),
            create: Arc::new(create),
        }
    }
}

/// Read-only view handed to a composite's `create`.
pub struct ExpansionContext<'a> {
    pub component: ComponentId,
    pub name: &'a str,
    pub template: &'a [SerializedNode],
    /// Replacements past this many are dropped; `create` should stop here.
    pub limit: usize,
    values: &'a IndexMap<&'static str, Value>,
    core: &'a DocumentCore,
}

impl ExpansionContext<'_> {
    /// The sentinel or one of the declared reads.
    pub fn value(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.core.component_id(name)
    }

    pub fn type_of(&self, id: ComponentId) -> Option<&TypeInfo> {
        self.core.component(id).map(|component| component.ty.as_ref())
    }

    pub fn vars_of(&self, id: ComponentId) -> Option<&VarTable> {
        self.core.component(id).map(|component| component.vars())
    }

    pub fn replacements_of(&self, id: ComponentId) -> &[ComponentId] {
        self.core
            .component(id)
            .map_or(&[], |component| component.replacements())
    }

    pub fn type_named(&self, name: &str) -> Option<&TypeInfo> {
        self.core.catalog.get(name).map(Arc::as_ref)
    }
}

/// Replacement changes of one composite during an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacementEvent {
    pub composite: String,
    pub changes: Vec<ReplacementChange>,
}
