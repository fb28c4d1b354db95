//! Live component instances.

pub mod attributes;
pub mod names;
pub mod serialized;

use crate::catalog::TypeInfo;
use crate::engine::arena::ComponentId;
use crate::engine::diagnostics::SourcePosition;
use crate::engine::tick::Revision;
use crate::statevar::VarTable;
use crate::value::Value;
use indexmap::IndexMap;
use serialized::{LinkTarget, SerializedComponent, SerializedNode};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum AttributeSlot {
    /// Already written to the essential slot of the generated variable.
    Primitive(Value),
    Reference { name: String, prop: Option<String> },
    Component(ComponentId),
}

/// Replacement bookkeeping of a composite.
#[derive(Debug, Clone, Default)]
pub struct CompositeState {
    pub replacements: Vec<ComponentId>,
    /// Serialized form of each replacement, compared on re-expansion.
    pub serialized: Vec<SerializedComponent>,
    /// Revision at which the sentinel was last expanded from.
    pub expanded_at: Option<Revision>,
    pub expanding: bool,
}

pub struct Component {
    pub(crate) ty: Arc<TypeInfo>,
    pub(crate) vars: Arc<VarTable>,
    pub(crate) name: String,
    pub(crate) parent: Option<ComponentId>,
    /// Children as authored or generated. Composites stay in this list;
    /// their replacements are spliced in when active children are read.
    pub(crate) children: Vec<ComponentId>,
    pub(crate) attributes: IndexMap<String, AttributeSlot>,
    /// Components instantiated for nested attribute values.
    pub(crate) attribute_components: Vec<ComponentId>,
    pub(crate) essential: IndexMap<String, Value>,
    pub(crate) link: Option<LinkTarget>,
    /// Unexpanded children kept for types that instantiate them per item.
    pub(crate) template: Vec<SerializedNode>,
    pub(crate) composite: Option<CompositeState>,
    /// The composite whose expansion created this component.
    pub(crate) owner: Option<ComponentId>,
    pub(crate) generated: bool,
    pub(crate) position: Option<SourcePosition>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component_type(&self) -> &'static str {
        self.ty.name
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub fn owner(&self) -> Option<ComponentId> {
        self.owner
    }

    pub fn position(&self) -> Option<SourcePosition> {
        self.position
    }

    pub fn is_composite(&self) -> bool {
        self.composite.is_some()
    }

    pub fn essential(&self, variable: &str) -> Option<&Value> {
        self.essential.get(variable)
    }

    pub fn replacements(&self) -> &[ComponentId] {
        self.composite
            .as_ref()
            .map_or(&[], |state| state.replacements.as_slice())
    }

    pub fn vars(&self) -> &VarTable {
        &self.vars
    }
}
