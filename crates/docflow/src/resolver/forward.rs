use super::graph::Gathered;
use super::{NodeState, NodeStatus};
use crate::document::{DocumentCore, shape_of};
use crate::engine::address::{NodeKey, NodePart};
use crate::engine::diagnostics::ChangeRecord;
use crate::error::CoreError;
use crate::statevar::array::{ArrayDef, EntryContext};
use crate::statevar::dependency::DependencySpec;
use crate::statevar::values::{DeterminingValues, ResolvedInputs};
use crate::statevar::{Definition, Outcome, StateVarDef, VarKind};
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Everything a recomputation produced, stored in one go.
struct Computed {
    value: Value,
    used_default: bool,
    producers: SmallVec<[NodeKey; 4]>,
    inputs: Option<Arc<ResolvedInputs>>,
    global: Option<Arc<ResolvedInputs>>,
    determining: Option<DeterminingValues>,
    spec: Option<Arc<DependencySpec>>,
    global_spec: Option<Arc<DependencySpec>>,
}

impl Computed {
    fn new(value: Value) -> Self {
        Self {
            value,
            used_default: false,
            producers: SmallVec::new(),
            inputs: None,
            global: None,
            determining: None,
            spec: None,
            global_spec: None,
        }
    }
}

impl DocumentCore {
    pub(crate) fn resolve_node(&mut self, key: NodeKey) -> Result<Value, CoreError> {
        self.ensure_fresh(key)?;
        Ok(self
            .nodes
            .get(&key)
            .map(|node| node.value.clone())
            .unwrap_or_default())
    }

    pub(crate) fn ensure_fresh(&mut self, key: NodeKey) -> Result<(), CoreError> {
        if !self.components.is_valid(key.component) {
            return Err(CoreError::UnknownComponent(format!("{:?}", key.component)));
        }
        let status = self.nodes.get(&key).map(|node| node.status);
        match status {
            Some(NodeStatus::Fresh) => Ok(()),
            Some(NodeStatus::Resolving) => Err(self.cycle_error(key)),
            Some(NodeStatus::Check) => {
                if self.producers_changed(key)? {
                    self.recompute(key)
                } else {
                    let revision = self.revisions.current();
                    if let Some(node) = self.nodes.get_mut(&key) {
                        node.status = NodeStatus::Fresh;
                        node.verified_at = revision;
                    }
                    Ok(())
                }
            }
            Some(NodeStatus::Dirty) | None => self.recompute(key),
        }
    }

    /// Bring every producer of a `Check` node up to date and report whether
    /// any of them changed after the node was last verified.
    fn producers_changed(&mut self, key: NodeKey) -> Result<bool, CoreError> {
        let Some(node) = self.nodes.get_mut(&key) else {
            return Ok(true);
        };
        let producers = node.producers.clone();
        let verified_at = node.verified_at;
        node.status = NodeStatus::Resolving;
        self.stack.push(key);

        let mut result = Ok(false);
        for producer in producers {
            if !self.components.is_valid(producer.component) {
                result = Ok(true);
                break;
            }
            if let Err(error) = self.ensure_fresh(producer) {
                result = Err(error);
                break;
            }
            let changed_at = self.nodes.get(&producer).map(|node| node.changed_at);
            if changed_at.is_none_or(|changed_at| changed_at > verified_at) {
                result = Ok(true);
                break;
            }
        }

        self.stack.pop();
        // Invalidated while verifying: recompute regardless.
        let redirtied = self.redirty.remove(&key);
        let result = result.map(|changed| changed || redirtied);
        if let Some(node) = self.nodes.get_mut(&key) {
            node.status = match result {
                Ok(false) => NodeStatus::Check,
                _ => NodeStatus::Dirty,
            };
        }
        result
    }

    fn recompute(&mut self, key: NodeKey) -> Result<(), CoreError> {
        let Some(def) = self.var_def(key.component, key.variable) else {
            return Err(CoreError::UnknownStateVariable {
                component: self.name_of(key.component),
                variable: format!("#{}", key.variable.0),
            });
        };
        self.node_entry(key).status = NodeStatus::Resolving;
        self.stack.push(key);
        let computed = self.compute(key, &def);
        self.stack.pop();
        match computed {
            Ok(computed) => {
                self.store(key, computed);
                Ok(())
            }
            Err(error) => {
                self.redirty.remove(&key);
                if let Some(node) = self.nodes.get_mut(&key) {
                    node.status = NodeStatus::Dirty;
                }
                Err(error)
            }
        }
    }

    fn node_entry(&mut self, key: NodeKey) -> &mut NodeState {
        let parts = self.var_parts.entry(key.var()).or_default();
        if !parts.contains(&key.part) {
            parts.push(key.part);
        }
        self.nodes.entry(key).or_insert_with(NodeState::new)
    }

    fn compute(&mut self, key: NodeKey, def: &StateVarDef) -> Result<Computed, CoreError> {
        let mut producers = SmallVec::new();
        let determining = self.determining_values(key, def, &mut producers)?;

        let mut computed = match (&def.kind, key.part) {
            (VarKind::Scalar(scalar), NodePart::Whole) => {
                let spec = self.cached_spec(key, &determining, false, || (scalar.dependencies)(&determining));
                let mut computed = match self.gather(key, &spec, &mut producers)? {
                    Gathered::Inputs(inputs) => {
                        let definition = (scalar.definition)(&inputs.values);
                        self.stats.record_definition(key);
                        let mut computed = self.apply_definition(key, def, definition, None);
                        computed.inputs = Some(Arc::new(inputs));
                        computed
                    }
                    Gathered::Unresolvable(message) => self.unresolvable(key, message),
                };
                computed.spec = Some(spec);
                computed
            }
            (VarKind::Array(array), NodePart::Size) => {
                let spec = self.cached_spec(key, &determining, false, || (array.size_dependencies)(&determining));
                let mut computed = match self.gather(key, &spec, &mut producers)? {
                    Gathered::Inputs(inputs) => {
                        let mut shape = (array.size)(&inputs.values);
                        shape.resize(array.dimensions.max(shape.len()), 0);
                        let limit = self.config.limits.max_array_entries;
                        if ArrayDef::clamp_shape(&mut shape, limit) {
                            let label = self.label(key);
                            self.warn(key.component, format!("{label} is larger than {limit} entries; truncated"));
                        }
                        self.stats.record_definition(key);
                        let mut computed = Computed::new(Value::array(
                            shape.into_iter().map(|dim| Value::Number(dim as f64)),
                        ));
                        computed.inputs = Some(Arc::new(inputs));
                        computed
                    }
                    Gathered::Unresolvable(message) => {
                        let mut computed = self.unresolvable(key, message);
                        computed.value = Value::array([Value::Number(0.0)]);
                        computed
                    }
                };
                computed.spec = Some(spec);
                computed
            }
            (VarKind::Array(array), NodePart::Entry(entry)) => {
                self.compute_entry(key, entry, def, array, &determining, &mut producers)?
            }
            (VarKind::Array(_), NodePart::Whole) => {
                let size_key = key.with_part(NodePart::Size);
                let shape = shape_of(&self.resolve_node(size_key)?);
                producers.push(size_key);
                let mut entries = Vec::with_capacity(ArrayDef::flat_len(&shape));
                for entry in 0..ArrayDef::flat_len(&shape) {
                    let entry_key = key.with_part(NodePart::Entry(entry));
                    entries.push(self.resolve_node(entry_key)?);
                    producers.push(entry_key);
                }
                Computed::new(ArrayDef::shape_value(&shape, entries))
            }
            (VarKind::Scalar(_), _) => Computed::new(Value::Null),
        };
        computed.producers.extend(producers);
        computed.determining = Some(determining);
        Ok(computed)
    }

    fn compute_entry(
        &mut self,
        key: NodeKey,
        entry: usize,
        def: &StateVarDef,
        array: &ArrayDef,
        determining: &DeterminingValues,
        producers: &mut SmallVec<[NodeKey; 4]>,
    ) -> Result<Computed, CoreError> {
        let size_key = key.with_part(NodePart::Size);
        let shape = shape_of(&self.resolve_node(size_key)?);
        producers.push(size_key);
        if entry >= ArrayDef::flat_len(&shape) {
            return Ok(Computed::new(Value::Null));
        }

        let global_spec = self.cached_spec(key, determining, true, || (array.global_dependencies)(determining));
        let global = match self.gather(key, &global_spec, producers)? {
            Gathered::Inputs(inputs) => Arc::new(inputs),
            Gathered::Unresolvable(message) => {
                let mut computed = self.unresolvable(key, message);
                computed.global_spec = Some(global_spec);
                return Ok(computed);
            }
        };
        let spec = Arc::new((array.dependencies_by_key)(entry, &shape, determining));
        let mut computed = match self.gather(key, &spec, producers)? {
            Gathered::Inputs(inputs) => {
                let definition = (array.definition_by_key)(&EntryContext {
                    key: entry,
                    shape: &shape,
                    global: &global.values,
                    dependencies: &inputs.values,
                });
                self.stats.record_definition(key);
                let default = (array.default_by_key)(entry, &global.values);
                let mut computed = self.apply_definition(key, def, definition, Some((entry, default)));
                computed.inputs = Some(Arc::new(inputs));
                computed
            }
            Gathered::Unresolvable(message) => self.unresolvable(key, message),
        };
        computed.global = Some(global);
        computed.spec = Some(spec);
        computed.global_spec = Some(global_spec);
        Ok(computed)
    }

    /// Values of the variables a dependency function may look at. Reading
    /// them makes them producers of the node.
    fn determining_values(
        &mut self,
        key: NodeKey,
        def: &StateVarDef,
        producers: &mut SmallVec<[NodeKey; 4]>,
    ) -> Result<DeterminingValues, CoreError> {
        let mut values = DeterminingValues::new();
        for name in &def.determining {
            let variable = self.require_var(key.component, name)?;
            let producer = NodeKey::whole(key.component, variable);
            values.insert(name.clone(), self.resolve_node(producer)?);
            producers.push(producer);
        }
        Ok(values)
    }

    /// Reuse the previous specification while the determining values are
    /// unchanged.
    fn cached_spec(
        &self,
        key: NodeKey,
        determining: &DeterminingValues,
        global: bool,
        build: impl FnOnce() -> DependencySpec,
    ) -> Arc<DependencySpec> {
        let cached = self.nodes.get(&key).and_then(|node| {
            let previous = node.determining.as_ref()?;
            if !previous.same_as(determining) {
                return None;
            }
            if global { node.global_spec.clone() } else { node.spec.clone() }
        });
        cached.unwrap_or_else(|| Arc::new(build()))
    }

    fn apply_definition(
        &mut self,
        key: NodeKey,
        def: &StateVarDef,
        definition: Definition,
        entry_default: Option<(usize, Value)>,
    ) -> Computed {
        for warning in definition.warnings {
            self.warn(key.component, warning);
        }
        let essential = self.essential_for(key, def, entry_default.as_ref().map(|(entry, _)| *entry));
        let declared_default = match entry_default {
            Some((_, default)) => default,
            None => def.default_value.clone(),
        };
        let (value, used_default) = match definition.outcome {
            Outcome::Value(value) => (value, false),
            Outcome::EssentialOrDefault(default) => match essential {
                Some(value) => (value, false),
                None => (default, true),
            },
            Outcome::Default => (declared_default, true),
        };
        let mut computed = Computed::new(value);
        computed.used_default = used_default;
        computed
    }

    /// The written essential value of a variable or of one of its entries.
    fn essential_for(&self, key: NodeKey, def: &StateVarDef, entry: Option<usize>) -> Option<Value> {
        let stored = self.components.get(key.component)?.essential.get(&def.name)?;
        match entry {
            None => Some(stored.clone()),
            Some(entry) => {
                let flat = ArrayDef::flatten_value(stored)?;
                flat.get(entry).filter(|value| !value.is_null()).cloned()
            }
        }
    }

    /// A required dependency could not be found: the node becomes an error
    /// value and the problem is reported once.
    fn unresolvable(&mut self, key: NodeKey, message: String) -> Computed {
        let label = self.label(key);
        self.report_error(key.component, format!("{label}: {message}"));
        Computed::new(Value::error(message))
    }

    fn store(&mut self, key: NodeKey, computed: Computed) {
        let revision = self.revisions.current();
        let redirty = self.redirty.remove(&key);
        let trace = self.config.diagnostics.trace_changes;

        let node = self.node_entry(key);
        let changed = !node.computed || !node.value.same_as(&computed.value);
        node.computed = true;
        let old_producers = std::mem::replace(&mut node.producers, computed.producers.clone());
        if changed {
            node.value = computed.value;
            node.changed_at = revision;
        }
        node.verified_at = revision;
        node.used_default = computed.used_default;
        node.inputs = computed.inputs;
        node.global = computed.global;
        node.determining = computed.determining;
        node.spec = computed.spec;
        node.global_spec = computed.global_spec;
        node.status = if redirty { NodeStatus::Dirty } else { NodeStatus::Fresh };

        for producer in old_producers {
            self.dependents.remove_edge(producer, key);
        }
        for producer in &computed.producers {
            self.dependents.add_edge(*producer, key);
        }

        if changed && trace {
            let triggered_by = computed
                .producers
                .iter()
                .filter(|producer| {
                    self.nodes
                        .get(producer)
                        .is_some_and(|node| node.changed_at == revision)
                })
                .copied()
                .collect();
            let label = self.label(key);
            log::trace!("{label} changed at revision {}", revision.0);
            self.changes.record(ChangeRecord {
                node: key,
                label,
                revision,
                triggered_by,
            });
        }
    }

    /// Mark nodes dirty and everything downstream of them possibly stale.
    /// Always starts a new revision.
    pub(crate) fn invalidate(&mut self, keys: impl IntoIterator<Item = NodeKey>) {
        self.revisions.advance();
        let mut queue: Vec<NodeKey> = Vec::new();
        for key in keys {
            let Some(node) = self.nodes.get_mut(&key) else {
                continue;
            };
            match node.status {
                NodeStatus::Resolving => {
                    self.redirty.insert(key);
                }
                _ => node.status = NodeStatus::Dirty,
            }
            self.note_sentinel(key);
            queue.push(key);
        }
        while let Some(key) = queue.pop() {
            let consumers: SmallVec<[NodeKey; 8]> = self.dependents.consumers_of(&key).collect();
            for consumer in consumers {
                let Some(node) = self.nodes.get_mut(&consumer) else {
                    continue;
                };
                match node.status {
                    NodeStatus::Fresh => {
                        node.status = NodeStatus::Check;
                        queue.push(consumer);
                    }
                    NodeStatus::Resolving => {
                        self.redirty.insert(consumer);
                    }
                    NodeStatus::Check | NodeStatus::Dirty => continue,
                }
                self.note_sentinel(consumer);
            }
        }
    }

    fn note_sentinel(&mut self, key: NodeKey) {
        if self.sentinel_key(key.component) == Some(key) {
            self.pending_composites.insert(key.component);
        }
    }

    /// Every part of a variable that has been resolved so far.
    pub(crate) fn var_nodes(&self, key: NodeKey) -> Vec<NodeKey> {
        self.var_parts
            .get(&key.var())
            .map(|parts| parts.iter().map(|part| key.with_part(*part)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn cycle_error(&self, key: NodeKey) -> CoreError {
        let start = self.stack.iter().position(|entry| *entry == key).unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..].iter().map(|entry| self.label(*entry)).collect();
        path.push(self.label(key));
        log::warn!("cycle detected: {}", path.join(" -> "));
        CoreError::Cycle { path }
    }
}
