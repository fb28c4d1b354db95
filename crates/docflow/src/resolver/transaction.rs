use crate::document::DocumentCore;
use crate::engine::address::{NodeKey, VarId};
use crate::engine::arena::ComponentId;
use crate::statevar::array::ArrayDef;
use crate::statevar::inverse::Workspace;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Staged {
    Whole(Value),
    Entries(BTreeMap<usize, Value>),
}

/// Essential writes collected while inverting one batch of requests.
/// Nothing touches the document until the whole batch inverted cleanly.
#[derive(Debug, Default)]
pub(crate) struct Transaction {
    staged: IndexMap<(ComponentId, VarId), Staged>,
    workspaces: FxHashMap<(ComponentId, VarId), Workspace>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_whole(&mut self, target: (ComponentId, VarId), value: Value) {
        self.staged.insert(target, Staged::Whole(value));
    }

    pub fn stage_entries(&mut self, target: (ComponentId, VarId), entries: BTreeMap<usize, Value>) {
        match self.staged.get_mut(&target) {
            Some(Staged::Entries(existing)) => existing.extend(entries),
            Some(Staged::Whole(whole)) => {
                let mut flat = ArrayDef::flatten_value(whole).unwrap_or_default();
                for (key, value) in entries {
                    if flat.len() <= key {
                        flat.resize(key + 1, Value::Null);
                    }
                    flat[key] = value;
                }
                *whole = Value::array(flat);
            }
            None => {
                self.staged.insert(target, Staged::Entries(entries));
            }
        }
    }

    pub fn workspace(&mut self, target: (ComponentId, VarId)) -> &mut Workspace {
        self.workspaces.entry(target).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

/// One committed essential write, kept for rollback and history.
#[derive(Debug, Clone, Serialize)]
pub struct EssentialWrite {
    #[serde(skip)]
    pub component: ComponentId,
    pub component_name: String,
    pub variable: String,
    pub before: Option<Value>,
    pub after: Value,
}

impl DocumentCore {
    /// Apply staged writes. Writes that leave the stored value unchanged are
    /// dropped, so nothing downstream of them is invalidated.
    pub(crate) fn commit(&mut self, transaction: Transaction) -> Vec<EssentialWrite> {
        let mut writes = Vec::new();
        let mut dirty = Vec::new();
        for ((id, variable), staged) in transaction.staged {
            let whole = NodeKey::whole(id, variable);
            let current = self
                .nodes
                .get(&whole)
                .filter(|node| node.computed)
                .map(|node| node.value.clone());
            let Some(component) = self.components.get_mut(id) else {
                continue;
            };
            let name = component.vars.name_of(variable).to_string();
            let before = component.essential.get(&name).cloned();
            let (after, touched) = match staged {
                Staged::Whole(value) => (value, None),
                Staged::Entries(entries) => {
                    let mut flat = before
                        .as_ref()
                        .and_then(ArrayDef::flatten_value)
                        .unwrap_or_default();
                    for (key, value) in &entries {
                        if flat.len() <= *key {
                            flat.resize(key + 1, Value::Null);
                        }
                        flat[*key] = value.clone();
                    }
                    (Value::array(flat), Some(entries.into_keys().collect::<Vec<_>>()))
                }
            };
            if before.as_ref().is_some_and(|before| before.same_as(&after)) {
                continue;
            }
            component.essential.insert(name.clone(), after.clone());
            // First write of a value the variable already shows.
            if before.is_none() && touched.is_none() && current.is_some_and(|current| current.same_as(&after)) {
                continue;
            }
            match touched {
                None => dirty.extend(self.var_nodes(whole)),
                Some(keys) => {
                    dirty.push(whole);
                    dirty.extend(keys.into_iter().map(|key| NodeKey::entry(id, variable, key)));
                }
            }
            log::trace!("essential write {}.{name}", self.name_of(id));
            writes.push(EssentialWrite {
                component: id,
                component_name: self.name_of(id),
                variable: name,
                before,
                after,
            });
        }
        if !dirty.is_empty() {
            self.invalidate(dirty);
        }
        writes
    }

    /// Undo committed writes, newest first.
    pub(crate) fn rollback(&mut self, writes: &[EssentialWrite]) {
        let mut dirty = Vec::new();
        for write in writes.iter().rev() {
            let Some(component) = self.components.get_mut(write.component) else {
                continue;
            };
            match &write.before {
                Some(before) => {
                    component.essential.insert(write.variable.clone(), before.clone());
                }
                None => {
                    component.essential.shift_remove(&write.variable);
                }
            }
            if let Some(variable) = component.vars.id_of(&write.variable) {
                dirty.extend(self.var_nodes(NodeKey::whole(write.component, variable)));
            }
        }
        self.invalidate(dirty);
    }
}
