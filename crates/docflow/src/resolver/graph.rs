//! Turning a dependency specification into values.

use crate::component::AttributeSlot;
use crate::document::{DocumentCore, shape_of};
use crate::engine::address::{NodeKey, flat_key};
use crate::engine::arena::ComponentId;
use crate::error::CoreError;
use crate::statevar::dependency::{ComponentTarget, Dependency, DependencyKind, DependencySpec, VarSelector};
use crate::statevar::values::{Binding, ChildValue, DependencyValue, ResolvedInputs};
use crate::value::Value;
use smallvec::SmallVec;

pub(super) enum Gathered {
    Inputs(ResolvedInputs),
    /// A required dependency could not be found.
    Unresolvable(String),
}

/// A target component plus the prop a reference asked for.
struct Found {
    id: ComponentId,
    prop: Option<String>,
}

enum Resolved {
    Value(DependencyValue, Binding),
    Missing(String),
}

impl DocumentCore {
    pub(super) fn gather(
        &mut self,
        consumer: NodeKey,
        spec: &DependencySpec,
        producers: &mut SmallVec<[NodeKey; 4]>,
    ) -> Result<Gathered, CoreError> {
        let mut inputs = ResolvedInputs::default();
        for (name, dependency) in spec.iter() {
            match self.resolve_dependency(consumer, dependency, producers)? {
                Resolved::Value(value, binding) => {
                    inputs.values.insert(name, value);
                    inputs.bindings.insert(name, binding);
                }
                Resolved::Missing(_) if dependency.optional => {
                    inputs.values.insert(name, DependencyValue::Missing);
                    inputs.bindings.insert(name, Binding::Unbound);
                }
                Resolved::Missing(reason) => {
                    return Ok(Gathered::Unresolvable(format!("{name}: {reason}")));
                }
            }
        }
        Ok(Gathered::Inputs(inputs))
    }

    fn resolve_dependency(
        &mut self,
        consumer: NodeKey,
        dependency: &Dependency,
        producers: &mut SmallVec<[NodeKey; 4]>,
    ) -> Result<Resolved, CoreError> {
        match &dependency.kind {
            DependencyKind::Constant(value) => Ok(Resolved::Value(
                DependencyValue::Value {
                    value: value.clone(),
                    used_default: false,
                },
                Binding::Unbound,
            )),
            DependencyKind::StateVar { target, variable } => {
                let Some(found) = self.find_target(consumer, target, producers)? else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let Some(key) = self.select_node(&found, variable)? else {
                    return Ok(Resolved::Missing(format!(
                        "{} has no such variable",
                        self.name_of(found.id)
                    )));
                };
                self.read_node(key, producers)
            }
            DependencyKind::ArraySize { target, variable } => {
                let Some(found) = self.find_target(consumer, target, producers)? else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let Some(variable) = self.select_variable(&found, variable) else {
                    return Ok(Resolved::Missing(format!(
                        "{} has no such variable",
                        self.name_of(found.id)
                    )));
                };
                let is_array = self
                    .var_def(found.id, variable)
                    .is_some_and(|def| def.is_array());
                if !is_array {
                    return Ok(Resolved::Missing(format!(
                        "{}.{} is not an array",
                        self.name_of(found.id),
                        self.components
                            .get(found.id)
                            .map_or("?", |component| component.vars.name_of(variable))
                    )));
                }
                self.read_node(NodeKey::size(found.id, variable), producers)
            }
            DependencyKind::ArrayEntry { target, variable, key } => {
                let Some(found) = self.find_target(consumer, target, producers)? else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let Some(variable) = self.select_variable(&found, variable) else {
                    return Ok(Resolved::Missing(format!(
                        "{} has no such variable",
                        self.name_of(found.id)
                    )));
                };
                let is_array = self
                    .var_def(found.id, variable)
                    .is_some_and(|def| def.is_array());
                let node = if is_array {
                    NodeKey::entry(found.id, variable, *key)
                } else {
                    NodeKey::whole(found.id, variable)
                };
                self.read_node(node, producers)
            }
            DependencyKind::Children { of, types, variable } => {
                let Some(parent) = self.find_target(consumer, of, producers)? else {
                    return Ok(Resolved::Missing(describe_target(of)));
                };
                self.dependents.watch_structure(parent.id, consumer);
                let children = self.active_children(parent.id, producers)?;
                let mut values = Vec::new();
                let mut bindings = Vec::new();
                for child in children {
                    let Some(component_type) = self.components.get(child).map(|c| c.ty.name) else {
                        continue;
                    };
                    if !types.is_empty() && !types.iter().any(|t| t == component_type) {
                        continue;
                    }
                    let (value, node) = match variable {
                        Some(selector) => {
                            let found = Found { id: child, prop: None };
                            match self.select_node(&found, selector)? {
                                Some(node) => {
                                    let value = self.resolve_node(node)?;
                                    producers.push(node);
                                    (value, Some(node))
                                }
                                None => (Value::Null, None),
                            }
                        }
                        None => (Value::Null, None),
                    };
                    values.push(ChildValue {
                        component: child,
                        component_type: component_type.into(),
                        value,
                    });
                    bindings.push((child, node));
                }
                Ok(Resolved::Value(
                    DependencyValue::Children(values),
                    Binding::Children(bindings),
                ))
            }
            DependencyKind::Identity { target } => {
                let Some(found) = self.find_target(consumer, target, producers)? else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let Some(component) = self.components.get(found.id) else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let mut fields = vec![
                    ("type".to_string(), Value::text(component.ty.name)),
                    ("name".to_string(), Value::text(component.name.as_str())),
                ];
                if let Some(prop) = found.prop {
                    fields.push(("prop".to_string(), Value::text(prop)));
                }
                if let Some(def) = &component.ty.composite {
                    fields.push(("sentinel".to_string(), Value::text(def.sentinel)));
                }
                Ok(Resolved::Value(
                    DependencyValue::Value {
                        value: Value::record(fields),
                        used_default: false,
                    },
                    Binding::Unbound,
                ))
            }
            DependencyKind::ReplacementCount { target } => {
                let Some(found) = self.find_target(consumer, target, producers)? else {
                    return Ok(Resolved::Missing(describe_target(target)));
                };
                let Some(sentinel) = self.sentinel_key(found.id) else {
                    return Ok(Resolved::Missing(format!("{} is not a composite", self.name_of(found.id))));
                };
                self.ensure_expanded(found.id)?;
                producers.push(sentinel);
                let count = self
                    .components
                    .get(found.id)
                    .map_or(0, |component| component.replacements().len());
                Ok(Resolved::Value(
                    DependencyValue::Value {
                        value: Value::Number(count as f64),
                        used_default: false,
                    },
                    Binding::Unbound,
                ))
            }
        }
    }

    fn read_node(&mut self, key: NodeKey, producers: &mut SmallVec<[NodeKey; 4]>) -> Result<Resolved, CoreError> {
        let value = self.resolve_node(key)?;
        let used_default = self.nodes.get(&key).is_some_and(|node| node.used_default);
        producers.push(key);
        Ok(Resolved::Value(
            DependencyValue::Value { value, used_default },
            Binding::Node(key),
        ))
    }

    fn find_target(
        &mut self,
        consumer: NodeKey,
        target: &ComponentTarget,
        producers: &mut SmallVec<[NodeKey; 4]>,
    ) -> Result<Option<Found>, CoreError> {
        let this = consumer.component;
        let found = |id: ComponentId| Some(Found { id, prop: None });
        Ok(match target {
            ComponentTarget::This => found(this),
            ComponentTarget::Parent => self.components.get(this).and_then(|c| c.parent).and_then(found),
            ComponentTarget::AncestorWith(variable) => {
                let mut current = self.components.get(this).and_then(|c| c.parent);
                let mut hit = None;
                while let Some(cursor) = current {
                    let Some(component) = self.components.get(cursor) else {
                        break;
                    };
                    if component.vars.id_of(variable).is_some() {
                        hit = Some(cursor);
                        break;
                    }
                    current = component.parent;
                }
                hit.and_then(found)
            }
            ComponentTarget::Named(name) => self.lookup(consumer, this, name).and_then(found),
            ComponentTarget::Attribute(attribute) => {
                let slot = self
                    .components
                    .get(this)
                    .and_then(|component| component.attributes.get(attribute))
                    .cloned();
                match slot {
                    Some(AttributeSlot::Component(id)) => found(id),
                    Some(AttributeSlot::Reference { name, prop }) => self
                        .lookup(consumer, this, &name)
                        .map(|id| Found { id, prop }),
                    Some(AttributeSlot::Primitive(_)) | None => None,
                }
            }
            ComponentTarget::Child { types, index } => {
                self.dependents.watch_structure(this, consumer);
                let children = self.active_children(this, producers)?;
                children
                    .into_iter()
                    .filter(|child| {
                        types.is_empty()
                            || self
                                .components
                                .get(*child)
                                .is_some_and(|c| types.iter().any(|t| t == c.ty.name))
                    })
                    .nth(*index)
                    .and_then(found)
            }
            ComponentTarget::Linked => self
                .components
                .get(this)
                .and_then(|component| component.link.as_ref())
                .map(|link| link.component)
                .filter(|id| self.components.is_valid(*id))
                .and_then(found),
            ComponentTarget::Id(id) => self.components.is_valid(*id).then_some(*id).and_then(found),
        })
    }

    /// Scoped name lookup. The consumer watches the name whether or not it
    /// resolves, so a component appearing or vanishing under it re-runs it.
    fn lookup(&mut self, consumer: NodeKey, from: ComponentId, reference: &str) -> Option<ComponentId> {
        let scopes = self.scopes(from);
        for scope in &scopes {
            self.dependents.watch_name(&format!("{scope}/{reference}"), consumer);
        }
        self.dependents.watch_name(reference, consumer);
        self.names
            .lookup_scoped(scopes.iter().map(String::as_str), reference)
    }

    fn select_variable(&self, found: &Found, selector: &VarSelector) -> Option<crate::engine::address::VarId> {
        let component = self.components.get(found.id)?;
        let name = match selector {
            VarSelector::Named(name) => name.as_str(),
            VarSelector::Primary => found.prop.as_deref().or(component.ty.primary_variable)?,
        };
        component.vars.address(name).map(|address| address.variable)
    }

    /// Node for a selector, honoring entry aliases such as `x2`.
    fn select_node(&mut self, found: &Found, selector: &VarSelector) -> Result<Option<NodeKey>, CoreError> {
        let Some(component) = self.components.get(found.id) else {
            return Ok(None);
        };
        let name = match selector {
            VarSelector::Named(name) => name.clone(),
            VarSelector::Primary => match found.prop.as_deref().or(component.ty.primary_variable) {
                Some(name) => name.to_string(),
                None => return Ok(None),
            },
        };
        let Some(address) = component.vars.address(&name) else {
            return Ok(None);
        };
        let Some(indices) = address.entry else {
            return Ok(Some(NodeKey::whole(found.id, address.variable)));
        };
        let shape = shape_of(&self.resolve_node(NodeKey::size(found.id, address.variable))?);
        let zero_based: Vec<usize> = indices.iter().map(|index| index - 1).collect();
        let key = flat_key(&shape, &zero_based).unwrap_or(usize::MAX);
        Ok(Some(NodeKey::entry(found.id, address.variable, key)))
    }

    /// Children with every composite replaced by its replacements,
    /// expanding composites that have not been expanded yet. The sentinel
    /// of every composite passed through becomes a producer.
    pub(crate) fn active_children(
        &mut self,
        parent: ComponentId,
        producers: &mut impl Extend<NodeKey>,
    ) -> Result<Vec<ComponentId>, CoreError> {
        let children = self
            .components
            .get(parent)
            .map(|component| component.children.clone())
            .unwrap_or_default();
        let mut active = Vec::with_capacity(children.len());
        for child in children {
            self.push_active(child, &mut active, producers)?;
        }
        Ok(active)
    }

    fn push_active(
        &mut self,
        id: ComponentId,
        active: &mut Vec<ComponentId>,
        producers: &mut impl Extend<NodeKey>,
    ) -> Result<(), CoreError> {
        let Some(sentinel) = self.sentinel_key(id) else {
            if self.components.is_valid(id) {
                active.push(id);
            }
            return Ok(());
        };
        self.ensure_expanded(id)?;
        producers.extend([sentinel]);
        let replacements = self
            .components
            .get(id)
            .map(|component| component.replacements().to_vec())
            .unwrap_or_default();
        for replacement in replacements {
            self.push_active(replacement, active, producers)?;
        }
        Ok(())
    }
}

fn describe_target(target: &ComponentTarget) -> String {
    match target {
        ComponentTarget::This => "own component is gone".to_string(),
        ComponentTarget::Parent => "no parent".to_string(),
        ComponentTarget::AncestorWith(variable) => format!("no ancestor with '{variable}'"),
        ComponentTarget::Named(name) => format!("no component named '{name}'"),
        ComponentTarget::Attribute(attribute) => format!("attribute '{attribute}' is not given"),
        ComponentTarget::Child { index, .. } => format!("no child at position {}", index + 1),
        ComponentTarget::Linked => "not linked".to_string(),
        ComponentTarget::Id(id) => format!("component {id:?} is gone"),
    }
}
