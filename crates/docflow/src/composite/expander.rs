use super::{CompositeDef, ExpansionContext, ReplacementChange, ReplacementEvent, calculate_replacement_changes};
use crate::component::names::replacement_name;
use crate::component::serialized::SerializedComponent;
use crate::document::{DocumentCore, Spawn};
use crate::engine::address::NodeKey;
use crate::engine::arena::ComponentId;
use crate::error::CoreError;
use crate::resolver::NodeStatus;
use crate::value::Value;
use indexmap::IndexMap;

impl DocumentCore {
    pub(crate) fn sentinel_key(&self, id: ComponentId) -> Option<NodeKey> {
        let component = self.components.get(id)?;
        let def = component.ty.composite.as_ref()?;
        Some(NodeKey::whole(id, component.vars.id_of(def.sentinel)?))
    }

    /// Expand a composite for the first time, or again if its sentinel
    /// changed since the last expansion. Returns whether it expanded.
    pub(crate) fn ensure_expanded(&mut self, id: ComponentId) -> Result<bool, CoreError> {
        let Some(sentinel) = self.sentinel_key(id) else {
            return Ok(false);
        };
        let Some(state) = self.components.get(id).and_then(|c| c.composite.as_ref()) else {
            return Ok(false);
        };
        // Re-entered from its own expansion: current replacements stand.
        if state.expanding {
            return Ok(false);
        }
        let expanded_at = state.expanded_at;
        let resolved = self.resolve_node(sentinel);
        let changed_at = self.nodes.get(&sentinel).map(|node| node.changed_at);
        let needed = match expanded_at {
            None => true,
            Some(at) => resolved.is_ok() && changed_at != Some(at),
        };
        if !needed {
            return Ok(false);
        }

        let Some(def) = self.components.get(id).and_then(|c| c.ty.composite.clone()) else {
            return Ok(false);
        };
        self.set_expanding(id, true);
        let created = self.create_replacements(id, &def, resolved);
        let result = self.replace_with(id, created, expanded_at.is_none());
        self.set_expanding(id, false);
        let revision = changed_at.unwrap_or_else(|| self.revisions.current());
        if let Some(state) = self.components.get_mut(id).and_then(|c| c.composite.as_mut()) {
            state.expanded_at = Some(revision);
        }
        self.stats.expansions += 1;
        result.map(|()| true)
    }

    fn set_expanding(&mut self, id: ComponentId, expanding: bool) {
        if let Some(state) = self.components.get_mut(id).and_then(|c| c.composite.as_mut()) {
            state.expanding = expanding;
        }
    }

    /// Serialized replacements for the current sentinel. Any problem leaves
    /// the composite with zero replacements and a warning.
    fn create_replacements(
        &mut self,
        id: ComponentId,
        def: &CompositeDef,
        resolved: Result<Value, CoreError>,
    ) -> Vec<SerializedComponent> {
        let name = self.name_of(id);
        let sentinel = match resolved {
            Ok(Value::Error(message)) => {
                self.warn(id, format!("{name} has no replacements: {message}"));
                return Vec::new();
            }
            Ok(value) => value,
            Err(error) => {
                self.warn(id, format!("{name} has no replacements: {error}"));
                return Vec::new();
            }
        };

        let mut values = IndexMap::new();
        values.insert(def.sentinel, sentinel);
        for read in &def.reads {
            let value = self
                .require_var(id, read)
                .and_then(|variable| self.resolve_node(NodeKey::whole(id, variable)));
            match value {
                Ok(value) => {
                    values.insert(*read, value);
                }
                Err(error) => {
                    self.warn(id, format!("{name} has no replacements: {error}"));
                    return Vec::new();
                }
            }
        }

        let template = self
            .components
            .get(id)
            .map(|component| component.template.clone())
            .unwrap_or_default();
        let limit = self.config.limits.max_replacements;
        // One past the limit so that truncation shows.
        let created = (def.create)(&ExpansionContext {
            component: id,
            name: &name,
            template: &template,
            limit: limit.saturating_add(1),
            values: &values,
            core: self,
        });
        match created {
            Ok(mut replacements) => {
                if replacements.len() > limit {
                    self.warn(id, format!("{name} produced more than {limit} replacements; keeping {limit}"));
                    replacements.truncate(limit);
                }
                replacements
            }
            Err(message) => {
                self.warn(id, format!("{name} has no replacements: {message}"));
                Vec::new()
            }
        }
    }

    fn replace_with(
        &mut self,
        id: ComponentId,
        new: Vec<SerializedComponent>,
        first: bool,
    ) -> Result<(), CoreError> {
        let Some(component) = self.components.get(id) else {
            return Ok(());
        };
        let name = component.name.clone();
        let parent = component.parent;
        let (old, mut replacements) = match &component.composite {
            Some(state) => (state.serialized.clone(), state.replacements.clone()),
            None => return Ok(()),
        };

        let changes = calculate_replacement_changes(&old, &new);
        let mut serialized = old;
        let applied = self.apply_replacement_changes(id, &changes, &new, &mut replacements, &mut serialized);
        // Written back even after a failure, so the list never holds freed ids.
        if let Some(state) = self.components.get_mut(id).and_then(|c| c.composite.as_mut()) {
            state.replacements = replacements;
            state.serialized = serialized;
        }
        applied?;
        if changes.is_empty() {
            return Ok(());
        }
        log::debug!("{name}: {} replacement change(s)", changes.len());
        if !first {
            if let Some(parent) = parent {
                let watchers = self.dependents.take_structure_watchers(parent);
                self.invalidate(watchers);
            }
        }
        self.replacement_events.push(ReplacementEvent {
            composite: name,
            changes,
        });
        Ok(())
    }

    /// Apply `changes` one replacement at a time, keeping `replacements`
    /// and `serialized` in step with each other.
    fn apply_replacement_changes(
        &mut self,
        id: ComponentId,
        changes: &[ReplacementChange],
        new: &[SerializedComponent],
        replacements: &mut Vec<ComponentId>,
        serialized: &mut Vec<SerializedComponent>,
    ) -> Result<(), CoreError> {
        let name = self.name_of(id);
        let parent = self.components.get(id).and_then(|component| component.parent);
        for change in changes {
            match *change {
                ReplacementChange::Replace { start, count } => {
                    for index in start..start + count {
                        self.remove_component(replacements[index])?;
                        match self.instantiate_replacement(id, &name, parent, &new[index], index) {
                            Ok(replacement) => {
                                replacements[index] = replacement;
                                serialized[index] = new[index].clone();
                            }
                            Err(error) => {
                                replacements.remove(index);
                                serialized.remove(index);
                                return Err(error);
                            }
                        }
                    }
                }
                ReplacementChange::Add { start, count } => {
                    for index in start..start + count {
                        let replacement = self.instantiate_replacement(id, &name, parent, &new[index], index)?;
                        replacements.push(replacement);
                        serialized.push(new[index].clone());
                    }
                }
                ReplacementChange::Remove { start, count } => {
                    for index in (start..start + count).rev() {
                        self.remove_component(replacements[index])?;
                        replacements.remove(index);
                        serialized.remove(index);
                    }
                }
            }
        }
        Ok(())
    }

    fn instantiate_replacement(
        &mut self,
        composite: ComponentId,
        composite_name: &str,
        parent: Option<ComponentId>,
        serialized: &SerializedComponent,
        index: usize,
    ) -> Result<ComponentId, CoreError> {
        let spawn = Spawn {
            parent,
            owner: Some(composite),
            name: Some(replacement_name(composite_name, serialized.name.as_deref(), index)),
        };
        self.instantiate(serialized, spawn)
    }

    /// Expand until no composite needs it. Only composites that were never
    /// expanded or whose sentinel was invalidated are looked at.
    pub(crate) fn settle(&mut self) -> Result<(), CoreError> {
        let rounds = self.config.limits.max_expansion_rounds;
        let mut unresolved = Vec::new();
        for _ in 0..rounds {
            if self.pending_composites.is_empty() {
                break;
            }
            let pending = std::mem::take(&mut self.pending_composites);
            for (index, id) in pending.iter().copied().enumerate() {
                if !self.components.is_valid(id) {
                    continue;
                }
                if let Err(error) = self.ensure_expanded(id) {
                    self.pending_composites.extend(pending.iter().skip(index).copied());
                    self.pending_composites.extend(unresolved);
                    return Err(error);
                }
                let sentinel_failed = self
                    .sentinel_key(id)
                    .and_then(|key| self.nodes.get(&key))
                    .is_some_and(|node| node.status == NodeStatus::Dirty);
                if sentinel_failed {
                    unresolved.push(id);
                }
            }
        }
        let settled = self.pending_composites.is_empty();
        // A sentinel that failed to resolve is retried on the next update.
        self.pending_composites.extend(unresolved);
        match settled {
            true => Ok(()),
            false => Err(CoreError::ExpansionLimit { rounds }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::component::serialized::SerializedComponent;
    use crate::config::CoreConfig;
    use crate::document::DocumentCore;

    #[test]
    fn only_invalidated_sentinels_queue_their_composite() {
        let root = SerializedComponent::new("document")
            .child(SerializedComponent::new("number").named("n").text("3"))
            .child(SerializedComponent::new("number").named("other").text("1"))
            .child(SerializedComponent::new("sequence").named("s").attr("to", "$n"));
        let mut core = DocumentCore::with_config(&root, &CoreConfig::default()).unwrap();
        assert!(core.pending_composites.is_empty());
        let sequence = core.component_id("s").unwrap();

        let other = core.node_key("other", "value").unwrap();
        core.invalidate([other]);
        assert!(core.pending_composites.is_empty());

        let n = core.node_key("n", "value").unwrap();
        core.invalidate([n]);
        assert!(core.pending_composites.contains(&sequence));
        core.settle().unwrap();
        assert!(core.pending_composites.is_empty());
    }
}
