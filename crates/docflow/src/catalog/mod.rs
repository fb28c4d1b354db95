//! Component types.
//!
//! A component type is a bundle of attribute schemas, state-variable
//! definitions, actions and optionally a composite definition. The engine
//! knows nothing about any particular type; it only runs what the catalog
//! hands it.

mod basic;
mod composites;
mod geometry;
mod inputs;
mod link;
mod numeric;

pub use composites::{CopyComponent, Iteration, Repeat, Sequence};
pub use geometry::{Point, Polygon, RigidMotion, rigid_motion};
pub use inputs::{MathInput, TextInput};
pub use numeric::{MathComponent, NumberComponent};
pub use basic::{BooleanComponent, Container, StringComponent, TextComponent};

use crate::component::attributes::AttributeSchema;
use crate::component::serialized::LinkTarget;
use crate::composite::CompositeDef;
use crate::config::CoreConfig;
use crate::engine::arena::ComponentId;
use crate::orchestrator::ValueRequest;
use crate::statevar::{StateVarDef, VarTable};
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub trait ComponentType: Send + Sync {
    fn name(&self) -> &'static str;

    fn attributes(&self) -> Vec<AttributeSchema> {
        Vec::new()
    }

    fn state_variables(&self, config: &CoreConfig) -> Vec<StateVarDef>;

    fn actions(&self) -> Vec<ActionDef> {
        Vec::new()
    }

    fn composite(&self) -> Option<CompositeDef> {
        None
    }

    /// Variable a reference to this component reads when no prop is given.
    fn primary_variable(&self) -> Option<&'static str> {
        None
    }

    /// Type a copy of this component is instantiated as.
    fn copy_as(&self) -> &'static str {
        self.name()
    }

    /// Keep children serialized instead of instantiating them.
    fn keeps_serialized_children(&self) -> bool {
        false
    }
}

pub struct ActionContext<'a> {
    pub component: ComponentId,
    pub args: &'a Value,
    pub reads: &'a IndexMap<String, Value>,
}

impl ActionContext<'_> {
    pub fn read(&self, name: &str) -> Value {
        self.reads.get(name).cloned().unwrap_or_default()
    }

    pub fn request(&self, variable: &str, value: Value) -> ValueRequest {
        ValueRequest::new(self.component, variable, value)
    }
}

/// "Set `target` to the actual value of `source`" once the main requests
/// of an action have been processed, whether or not they succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub target: (ComponentId, String),
    pub source: (ComponentId, String),
}

#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub requests: Vec<ValueRequest>,
    pub chain: Vec<ChainStep>,
    /// Overrides the caller's `transient` flag when set.
    pub transient: Option<bool>,
}

pub type ActionHandler = Arc<dyn Fn(&ActionContext<'_>) -> Result<ActionPlan, String> + Send + Sync>;

#[derive(Clone)]
pub struct ActionDef {
    pub name: &'static str,
    /// Own variables resolved before the handler runs.
    pub reads: Vec<&'static str>,
    pub handler: ActionHandler,
}

impl ActionDef {
    pub fn new(
        name: &'static str,
        reads: &[&'static str],
        handler: impl Fn(&ActionContext<'_>) -> Result<ActionPlan, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            reads: reads.to_vec(),
            handler: Arc::new(handler),
        }
    }
}

/// Everything the engine needs to know about a type, built once per catalog.
pub struct TypeInfo {
    pub name: &'static str,
    pub attributes: IndexMap<&'static str, AttributeSchema>,
    pub vars: Arc<VarTable>,
    pub actions: IndexMap<&'static str, ActionDef>,
    pub composite: Option<CompositeDef>,
    pub primary_variable: Option<&'static str>,
    pub copy_as: &'static str,
    pub keeps_serialized_children: bool,
}

impl TypeInfo {
    fn build(component_type: &dyn ComponentType, config: &CoreConfig) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert("fixed", AttributeSchema::boolean("fixed", false).for_renderer());
        for schema in component_type.attributes() {
            attributes.insert(schema.name, schema);
        }

        let mut vars = VarTable::default();
        for schema in attributes.values().filter(|schema| schema.creates_state_variable) {
            vars.push(schema.state_variable());
        }
        for def in component_type.state_variables(config) {
            vars.push(def);
        }

        Self {
            name: component_type.name(),
            attributes,
            vars: Arc::new(vars),
            actions: component_type
                .actions()
                .into_iter()
                .map(|action| (action.name, action))
                .collect(),
            composite: component_type.composite(),
            primary_variable: component_type.primary_variable(),
            copy_as: component_type.copy_as(),
            keeps_serialized_children: component_type.keeps_serialized_children(),
        }
    }

    /// Variable table of an instance linked to `link`: the primary variable
    /// mirrors the link target instead of computing its own value.
    pub fn linked_vars(&self, link: &LinkTarget, target_is_array: bool) -> Arc<VarTable> {
        let Some(primary) = self.primary_variable else {
            return self.vars.clone();
        };
        let mut vars = (*self.vars).clone();
        let def = if target_is_array && link.key.is_none() {
            link::linked_array(primary, link)
        } else {
            link::linked_scalar(primary, link)
        };
        vars.push(def);
        Arc::new(vars)
    }
}

pub struct ComponentCatalog {
    config: CoreConfig,
    types: FxHashMap<&'static str, Arc<TypeInfo>>,
}

impl ComponentCatalog {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            config: config.clone(),
            types: FxHashMap::default(),
        }
    }

    /// Catalog with every built-in type registered.
    pub fn standard(config: &CoreConfig) -> Self {
        let mut catalog = Self::new(config);
        catalog.register(Container::new("document"));
        catalog.register(Container::new("section"));
        catalog.register(Container::new("group"));
        catalog.register(StringComponent);
        catalog.register(TextComponent);
        catalog.register(BooleanComponent);
        catalog.register(NumberComponent);
        catalog.register(MathComponent);
        catalog.register(TextInput);
        catalog.register(MathInput);
        catalog.register(Point);
        catalog.register(Polygon);
        catalog.register(Sequence);
        catalog.register(Repeat);
        catalog.register(Iteration);
        catalog.register(CopyComponent);
        catalog
    }

    pub fn register(&mut self, component_type: impl ComponentType + 'static) {
        let info = TypeInfo::build(&component_type, &self.config);
        self.types.insert(info.name, Arc::new(info));
    }

    pub fn with(mut self, component_type: impl ComponentType + 'static) -> Self {
        self.register(component_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeInfo>> {
        self.types.get(name)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_gets_fixed() {
        let catalog = ComponentCatalog::standard(&CoreConfig::default());
        for name in ["number", "point", "polygon", "textInput", "sequence"] {
            let info = catalog.get(name).unwrap();
            assert!(info.vars.id_of("fixed").is_some(), "{name} lacks fixed");
        }
    }

    #[test]
    fn primary_and_copy_types() {
        let catalog = ComponentCatalog::standard(&CoreConfig::default());
        let input = catalog.get("mathInput").unwrap();
        assert_eq!(input.primary_variable, Some("value"));
        assert_eq!(input.copy_as, "math");
        assert!(catalog.get("sequence").unwrap().composite.is_some());
        assert!(catalog.get("repeat").unwrap().keeps_serialized_children);
    }
}
