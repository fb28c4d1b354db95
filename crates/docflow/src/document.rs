//! A live document: the component tree, the state-variable store and the
//! bookkeeping that ties them together.

use crate::catalog::{ComponentCatalog, TypeInfo};
use crate::component::attributes::AttributeKind;
use crate::component::names::{NameRegistry, generated_name};
use crate::component::serialized::{SerializedAttribute, SerializedComponent, SerializedNode};
use crate::component::{AttributeSlot, Component, CompositeState};
use crate::composite::ReplacementEvent;
use crate::config::CoreConfig;
use crate::engine::address::{NodeKey, NodePart, VarId, flat_key};
use crate::engine::arena::{Arena, ComponentId};
use crate::engine::diagnostics::{ChangeLog, Diagnostic, DiagnosticLog, EvalStats};
use crate::engine::routing::DependentsIndex;
use crate::engine::tick::RevisionCounter;
use crate::error::CoreError;
use crate::orchestrator::HistoryEntry;
use crate::resolver::NodeState;
use crate::statevar::StateVarDef;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;

/// Where a new component goes and what it is called.
#[derive(Debug, Clone, Default)]
pub(crate) struct Spawn {
    pub parent: Option<ComponentId>,
    pub owner: Option<ComponentId>,
    /// Preassigned name; set for everything a composite generates.
    pub name: Option<String>,
}

pub struct DocumentCore {
    pub(crate) catalog: Arc<ComponentCatalog>,
    pub(crate) config: CoreConfig,
    pub(crate) components: Arena<Component>,
    pub(crate) names: NameRegistry,
    pub(crate) root: ComponentId,
    pub(crate) nodes: FxHashMap<NodeKey, NodeState>,
    /// Node parts created so far for each variable.
    pub(crate) var_parts: FxHashMap<(ComponentId, VarId), SmallVec<[NodePart; 2]>>,
    pub(crate) dependents: DependentsIndex,
    pub(crate) revisions: RevisionCounter,
    /// Nodes currently being resolved, outermost first.
    pub(crate) stack: Vec<NodeKey>,
    /// Resolving nodes invalidated mid-computation.
    pub(crate) redirty: FxHashSet<NodeKey>,
    pub(crate) diagnostics: DiagnosticLog,
    pub(crate) changes: ChangeLog,
    pub(crate) stats: EvalStats,
    pub(crate) history: Vec<HistoryEntry>,
    /// Last reported renderer values, once renderer tracking is on.
    pub(crate) renderer_baseline: Option<IndexMap<NodeKey, Value>>,
    pub(crate) replacement_events: Vec<ReplacementEvent>,
    /// Composites never expanded or whose sentinel was invalidated since.
    pub(crate) pending_composites: IndexSet<ComponentId>,
}

impl DocumentCore {
    /// Instantiate a serialized tree and expand every composite in it.
    pub fn new(root: &SerializedComponent, catalog: Arc<ComponentCatalog>) -> Result<Self, CoreError> {
        let config = catalog.config().clone();
        let mut core = Self {
            catalog,
            config,
            components: Arena::new(),
            names: NameRegistry::new(),
            root: ComponentId::INVALID,
            nodes: FxHashMap::default(),
            var_parts: FxHashMap::default(),
            dependents: DependentsIndex::new(),
            revisions: RevisionCounter::new(),
            stack: Vec::new(),
            redirty: FxHashSet::default(),
            diagnostics: DiagnosticLog::new(),
            changes: ChangeLog::default(),
            stats: EvalStats::default(),
            history: Vec::new(),
            renderer_baseline: None,
            replacement_events: Vec::new(),
            pending_composites: IndexSet::new(),
        };
        core.root = core.instantiate(root, Spawn::default())?;
        core.settle()?;
        core.replacement_events.clear();
        log::debug!(
            "document ready: {} components, {} diagnostics",
            core.components.len(),
            core.diagnostics.len()
        );
        Ok(core)
    }

    /// Document over the built-in component types.
    pub fn with_config(root: &SerializedComponent, config: &CoreConfig) -> Result<Self, CoreError> {
        Self::new(root, Arc::new(ComponentCatalog::standard(config)))
    }

    pub fn root(&self) -> ComponentId {
        self.root
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.names.get(name)
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn component_by_name(&self, name: &str) -> Option<&Component> {
        self.names.get(name).and_then(|id| self.components.get(id))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn stats(&self) -> &EvalStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Current value of `component.variable`. Entry aliases such as `x2`
    /// resolve just that entry.
    pub fn resolve(&mut self, component: &str, variable: &str) -> Result<Value, CoreError> {
        let key = self.node_key(component, variable)?;
        self.resolve_node(key)
    }

    pub fn resolve_id(&mut self, id: ComponentId, variable: &str) -> Result<Value, CoreError> {
        let key = self.address_key(id, variable)?;
        self.resolve_node(key)
    }

    /// One entry of an array variable by flat key.
    pub fn resolve_entry(&mut self, component: &str, variable: &str, key: usize) -> Result<Value, CoreError> {
        let id = self.require_component(component)?;
        let var = self.require_var(id, variable)?;
        self.resolve_node(NodeKey::entry(id, var, key))
    }

    /// Node behind `component.variable`, for stats and change queries.
    pub fn node_key(&mut self, component: &str, variable: &str) -> Result<NodeKey, CoreError> {
        let id = self.require_component(component)?;
        self.address_key(id, variable)
    }

    /// Names of the active children: composites are replaced by their
    /// replacements.
    pub fn active_children_names(&mut self, component: &str) -> Result<Vec<String>, CoreError> {
        let id = self.require_component(component)?;
        let mut producers: Vec<NodeKey> = Vec::new();
        let children = self.active_children(id, &mut producers)?;
        Ok(children.into_iter().map(|child| self.name_of(child)).collect())
    }

    pub fn replacement_names(&self, component: &str) -> Result<Vec<String>, CoreError> {
        let composite = self
            .component_by_name(component)
            .ok_or_else(|| CoreError::UnknownComponent(component.to_string()))?;
        Ok(composite
            .replacements()
            .iter()
            .map(|id| self.name_of(*id))
            .collect())
    }

    /// The recorded change of a variable and what caused it, newest first.
    /// Empty unless change tracing is on.
    pub fn why_did_change(&mut self, component: &str, variable: &str) -> Result<Vec<String>, CoreError> {
        let key = self.node_key(component, variable)?;
        Ok(self
            .changes
            .change_chain(&key)
            .into_iter()
            .map(|record| format!("{} (revision {})", record.label, record.revision.0))
            .collect())
    }

    pub(crate) fn require_component(&self, name: &str) -> Result<ComponentId, CoreError> {
        self.names
            .get(name)
            .ok_or_else(|| CoreError::UnknownComponent(name.to_string()))
    }

    pub(crate) fn require_var(&self, id: ComponentId, variable: &str) -> Result<VarId, CoreError> {
        self.components
            .get(id)
            .and_then(|component| component.vars.id_of(variable))
            .ok_or_else(|| self.unknown_var(id, variable))
    }

    pub(crate) fn unknown_var(&self, id: ComponentId, variable: &str) -> CoreError {
        CoreError::UnknownStateVariable {
            component: self.name_of(id),
            variable: variable.to_string(),
        }
    }

    /// Node for a plain variable name or an entry alias.
    pub(crate) fn address_key(&mut self, id: ComponentId, variable: &str) -> Result<NodeKey, CoreError> {
        let address = self
            .components
            .get(id)
            .and_then(|component| component.vars.address(variable))
            .ok_or_else(|| self.unknown_var(id, variable))?;
        let Some(indices) = address.entry else {
            return Ok(NodeKey::whole(id, address.variable));
        };
        let shape = self.array_shape(id, address.variable)?;
        let zero_based: Vec<usize> = indices.iter().map(|index| index - 1).collect();
        // Past the end resolves to Null.
        let key = flat_key(&shape, &zero_based).unwrap_or(usize::MAX);
        Ok(NodeKey::entry(id, address.variable, key))
    }

    pub(crate) fn array_shape(&mut self, id: ComponentId, variable: VarId) -> Result<Vec<usize>, CoreError> {
        let size = self.resolve_node(NodeKey::size(id, variable))?;
        Ok(shape_of(&size))
    }

    pub(crate) fn var_def(&self, id: ComponentId, variable: VarId) -> Option<Arc<StateVarDef>> {
        self.components.get(id)?.vars.get(variable).cloned()
    }

    pub(crate) fn name_of(&self, id: ComponentId) -> String {
        self.components
            .get(id)
            .map_or_else(|| format!("{id:?}"), |component| component.name.clone())
    }

    /// `component.variable`, with `[key]` for entries.
    pub(crate) fn label(&self, key: NodeKey) -> String {
        let Some(component) = self.components.get(key.component) else {
            return format!("{:?}.{}", key.component, key.variable.0);
        };
        let variable = component.vars.name_of(key.variable);
        match key.part {
            NodePart::Whole => format!("{}.{variable}", component.name),
            NodePart::Size => format!("{}.{variable}#size", component.name),
            NodePart::Entry(entry) => format!("{}.{variable}[{entry}]", component.name),
        }
    }

    pub(crate) fn warn(&mut self, id: ComponentId, message: impl Into<String>) {
        let diagnostic = self.attach(id, Diagnostic::warning(message));
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn report_error(&mut self, id: ComponentId, message: impl Into<String>) {
        let diagnostic = self.attach(id, Diagnostic::error(message));
        self.diagnostics.push(diagnostic);
    }

    fn attach(&self, id: ComponentId, diagnostic: Diagnostic) -> Diagnostic {
        match self.components.get(id) {
            Some(component) => diagnostic.at(Some(component.name.clone()), self.position_of(id)),
            None => diagnostic,
        }
    }

    /// Source position of a component, or of its nearest positioned
    /// ancestor or owner.
    fn position_of(&self, id: ComponentId) -> Option<crate::engine::diagnostics::SourcePosition> {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let component = self.components.get(cursor)?;
            if component.position.is_some() {
                return component.position;
            }
            current = component.owner.or(component.parent);
        }
        None
    }

    /// Names of `id` and its ancestors, innermost first, for scoped lookup.
    pub(crate) fn scopes(&self, id: ComponentId) -> Vec<String> {
        let mut scopes = Vec::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            let Some(component) = self.components.get(cursor) else {
                break;
            };
            scopes.push(component.name.clone());
            current = component.parent;
        }
        scopes
    }

    pub(crate) fn instantiate(
        &mut self,
        serialized: &SerializedComponent,
        spawn: Spawn,
    ) -> Result<ComponentId, CoreError> {
        let ty = self.type_for(serialized, &spawn)?;
        let generated = spawn.name.is_some();
        let name = match spawn.name {
            Some(name) => name,
            None => self.authored_name(serialized, &ty),
        };
        let vars = match &serialized.link {
            Some(link) => {
                let target_is_array = self
                    .components
                    .get(link.component)
                    .and_then(|target| {
                        let variable = target.vars.id_of(&link.variable)?;
                        target.vars.get(variable)
                    })
                    .is_some_and(|def| def.is_array());
                ty.linked_vars(link, target_is_array)
            }
            None => ty.vars.clone(),
        };
        let id = self.components.alloc(Component {
            ty: ty.clone(),
            vars,
            name: name.clone(),
            parent: spawn.parent,
            children: Vec::new(),
            attributes: IndexMap::new(),
            attribute_components: Vec::new(),
            essential: IndexMap::new(),
            link: serialized.link.clone(),
            template: Vec::new(),
            composite: ty.composite.as_ref().map(|_| CompositeState::default()),
            owner: spawn.owner,
            generated,
            position: serialized.position,
        });
        log::trace!("instantiate <{}> {name}", ty.name);
        if ty.composite.is_some() {
            self.pending_composites.insert(id);
        }
        if !self.names.register(&name, id) {
            self.warn(id, format!("name '{name}' is already in use"));
        }
        let watchers = self.dependents.take_name_watchers(&name);
        self.invalidate(watchers);

        self.instantiate_attributes(id, &name, serialized, &ty, spawn.owner)?;
        if ty.keeps_serialized_children {
            if let Some(component) = self.components.get_mut(id) {
                component.template = serialized.children.clone();
            }
        } else {
            let children = self.instantiate_children(id, &name, generated, spawn.owner, &serialized.children)?;
            if let Some(component) = self.components.get_mut(id) {
                component.children = children;
            }
        }
        Ok(id)
    }

    fn type_for(&mut self, serialized: &SerializedComponent, spawn: &Spawn) -> Result<Arc<TypeInfo>, CoreError> {
        if let Some(ty) = self.catalog.get(&serialized.component_type) {
            return Ok(ty.clone());
        }
        let message = format!("unknown component type '{}'", serialized.component_type);
        self.diagnostics
            .push(Diagnostic::error(message.clone()).at(spawn.name.clone(), serialized.position));
        self.catalog
            .get("group")
            .cloned()
            .ok_or(CoreError::Configuration(message))
    }

    fn authored_name(&mut self, serialized: &SerializedComponent, ty: &TypeInfo) -> String {
        match &serialized.name {
            Some(name) if self.names.get(name).is_none() => name.clone(),
            Some(name) => {
                self.diagnostics.push(
                    Diagnostic::warning(format!("duplicate component name '{name}'"))
                        .at(Some(name.clone()), serialized.position),
                );
                self.names.unnamed(ty.name)
            }
            None => self.names.unnamed(ty.name),
        }
    }

    fn instantiate_attributes(
        &mut self,
        id: ComponentId,
        name: &str,
        serialized: &SerializedComponent,
        ty: &TypeInfo,
        owner: Option<ComponentId>,
    ) -> Result<(), CoreError> {
        for (attribute, given) in &serialized.attributes {
            let Some(schema) = ty.attributes.get(attribute.as_str()) else {
                self.warn(id, format!("<{}> has no attribute '{attribute}'", ty.name));
                continue;
            };
            let slot = if let Some(reference) = given.as_reference() {
                AttributeSlot::Reference {
                    name: reference.target,
                    prop: reference.prop,
                }
            } else {
                let raw = match given {
                    SerializedAttribute::Component(child) => {
                        let spawn = Spawn {
                            parent: Some(id),
                            owner,
                            name: Some(format!("{name}/{attribute}")),
                        };
                        let child = self.instantiate(child, spawn)?;
                        if let Some(component) = self.components.get_mut(id) {
                            component.attribute_components.push(child);
                            component
                                .attributes
                                .insert(attribute.clone(), AttributeSlot::Component(child));
                        }
                        continue;
                    }
                    SerializedAttribute::Bool(flag) => Value::Bool(*flag),
                    SerializedAttribute::Number(number) => Value::Number(*number),
                    SerializedAttribute::Text(text) => Value::text(text.as_str()),
                    SerializedAttribute::Reference(_) => Value::Null,
                };
                if schema.kind == AttributeKind::Reference {
                    self.report_error(id, format!("attribute '{attribute}' must reference a component"));
                    continue;
                }
                let value = schema.kind.convert(&raw);
                if let Value::Error(message) = &value {
                    self.report_error(id, format!("attribute '{attribute}': {message}"));
                }
                if let Some(component) = self.components.get_mut(id) {
                    if schema.creates_state_variable {
                        component.essential.insert(schema.variable.to_string(), value.clone());
                    }
                }
                AttributeSlot::Primitive(value)
            };
            if let Some(component) = self.components.get_mut(id) {
                component.attributes.insert(attribute.clone(), slot);
            }
        }
        Ok(())
    }

    fn instantiate_children(
        &mut self,
        id: ComponentId,
        name: &str,
        generated: bool,
        owner: Option<ComponentId>,
        children: &[SerializedNode],
    ) -> Result<Vec<ComponentId>, CoreError> {
        let mut ids = Vec::with_capacity(children.len());
        for (position, node) in children.iter().enumerate() {
            let (serialized, text) = match node {
                SerializedNode::Text(text) => (SerializedComponent::new("string"), Some(text)),
                SerializedNode::Reference(reference) => {
                    let mut copy = SerializedComponent::new("copy").attr("target", reference.target.as_str());
                    if let Some(prop) = &reference.prop {
                        copy = copy.attr("prop", prop.as_str());
                    }
                    (copy, None)
                }
                SerializedNode::Component(child) => (child.clone(), None),
            };
            let spawn = Spawn {
                parent: Some(id),
                owner,
                name: generated.then(|| {
                    generated_name(
                        name,
                        serialized.name.as_deref(),
                        &serialized.component_type,
                        position,
                    )
                }),
            };
            let child = self.instantiate(&serialized, spawn)?;
            if let (Some(text), Some(component)) = (text, self.components.get_mut(child)) {
                component.essential.insert("value".to_string(), Value::text(text.as_str()));
            }
            ids.push(child);
        }
        Ok(ids)
    }

    /// Every component reachable from `id`: children, attribute components
    /// and replacements.
    pub(crate) fn subtree(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            let Some(component) = self.components.get(current) else {
                continue;
            };
            out.push(current);
            queue.extend(component.children.iter().copied());
            queue.extend(component.attribute_components.iter().copied());
            queue.extend(component.replacements().iter().copied());
        }
        out
    }

    /// Tear down a component and everything under it. Consumers that read
    /// any of it are invalidated.
    pub(crate) fn remove_component(&mut self, id: ComponentId) -> Result<(), CoreError> {
        let subtree = self.subtree(id);
        let doomed: FxHashSet<ComponentId> = subtree.iter().copied().collect();
        if let Some(key) = self.stack.iter().find(|key| doomed.contains(&key.component)).copied() {
            return Err(self.cycle_error(key));
        }
        let mut affected = Vec::new();
        for component in subtree {
            self.drop_nodes(component);
            affected.extend(self.dependents.remove_component(component));
            if let Some(removed) = self.components.free(component) {
                log::trace!("remove {}", removed.name);
                self.names.unregister(&removed.name, component);
                affected.extend(self.dependents.take_name_watchers(&removed.name));
            }
        }
        affected.retain(|key| !doomed.contains(&key.component));
        self.invalidate(affected);
        Ok(())
    }

    fn drop_nodes(&mut self, id: ComponentId) {
        let Some(component) = self.components.get(id) else {
            return;
        };
        let vars: Vec<VarId> = component.vars.iter().map(|(variable, _)| variable).collect();
        for variable in vars {
            if let Some(parts) = self.var_parts.remove(&(id, variable)) {
                for part in parts {
                    self.nodes.remove(&NodeKey::whole(id, variable).with_part(part));
                }
            }
        }
    }
}

/// Shape stored in a size node.
pub(crate) fn shape_of(size: &Value) -> Vec<usize> {
    size.as_array()
        .map(|dims| dims.iter().map(|dim| dim.to_number().max(0.0) as usize).collect())
        .unwrap_or_default()
}
