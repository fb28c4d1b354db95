//! Inverse evaluation: routing a desired value back to essential slots.

use super::Transaction;
use crate::document::DocumentCore;
use crate::engine::address::{NodeKey, NodePart, VarId};
use crate::engine::arena::ComponentId;
use crate::error::{CoreError, InverseFailure, InverseFailureReason};
use crate::statevar::array::ArrayDef;
use crate::statevar::inverse::{ArrayInverseContext, InverseContext, InverseInstruction};
use crate::statevar::values::{Binding, ResolvedInputs};
use crate::statevar::{StateVarDef, VarKind};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a variable is asked to become.
#[derive(Debug, Clone)]
pub(crate) enum Desired {
    Whole(Value),
    /// Flat array keys.
    Entries(BTreeMap<usize, Value>),
}

/// Inputs an inverse definition saw, needed to route its instructions.
struct Routing<'a> {
    scalar: Option<&'a ResolvedInputs>,
    global: Option<&'a ResolvedInputs>,
    by_key: &'a BTreeMap<usize, Arc<ResolvedInputs>>,
}

impl DocumentCore {
    pub(crate) fn invert(
        &mut self,
        id: ComponentId,
        variable: VarId,
        desired: Desired,
        transaction: &mut Transaction,
        depth: usize,
    ) -> Result<(), InverseFailure> {
        let key = NodeKey::whole(id, variable);
        let label = self.label(key);
        let fail = |reason| InverseFailure::new(label.clone(), reason);
        let core = |error: CoreError| InverseFailure::new(label.clone(), InverseFailureReason::Core(error));
        self.stats.inversions += 1;

        if depth > self.config.limits.max_inverse_depth {
            return Err(fail(InverseFailureReason::DepthExceeded));
        }
        let Some(def) = self.var_def(id, variable) else {
            return Err(fail(InverseFailureReason::MissingDependency(label.clone())));
        };
        if self.is_fixed(id, &def).map_err(core)? {
            return Err(fail(InverseFailureReason::Fixed));
        }

        match &def.kind {
            VarKind::Scalar(scalar) => {
                let Desired::Whole(desired) = desired else {
                    return Err(fail(InverseFailureReason::NotInvertible));
                };
                self.ensure_fresh(key).map_err(core)?;
                let (current, inputs) = self
                    .nodes
                    .get(&key)
                    .map(|node| (node.value.clone(), node.inputs.clone()))
                    .unwrap_or_default();
                let Some(inverse) = &scalar.inverse else {
                    if def.has_essential {
                        transaction.stage_whole((id, variable), desired);
                        return Ok(());
                    }
                    return Err(fail(InverseFailureReason::NotInvertible));
                };
                let inputs = inputs.unwrap_or_default();
                let instructions = inverse(&mut InverseContext {
                    desired: &desired,
                    current: &current,
                    dependencies: &inputs.values,
                    workspace: transaction.workspace((id, variable)),
                })
                .map_err(|message| fail(InverseFailureReason::Rejected(message)))?;
                let routing = Routing {
                    scalar: Some(inputs.as_ref()),
                    global: None,
                    by_key: &BTreeMap::new(),
                };
                self.apply_instructions(id, variable, &label, instructions, &routing, transaction, depth)
            }
            VarKind::Array(array) => {
                let entries = match desired {
                    Desired::Entries(entries) => entries,
                    Desired::Whole(value) => ArrayDef::flatten_value(&value)
                        .ok_or_else(|| fail(InverseFailureReason::Rejected("expected an array".to_string())))?
                        .into_iter()
                        .enumerate()
                        .collect(),
                };
                let shape = self.array_shape(id, variable).map_err(core)?;
                let len = ArrayDef::flat_len(&shape);
                if let Some(bad) = entries.keys().find(|entry| **entry >= len) {
                    return Err(fail(InverseFailureReason::NoSuchArrayKey(*bad)));
                }
                let merged = transaction.workspace((id, variable)).merge_desired(entries);
                let Some(inverse) = &array.inverse_by_key else {
                    if def.has_essential {
                        transaction.stage_entries((id, variable), merged);
                        return Ok(());
                    }
                    return Err(fail(InverseFailureReason::NotInvertible));
                };

                // Inverses may route keys beyond the desired ones.
                let current = ArrayDef::flatten_value(&self.resolve_node(key).map_err(core)?).unwrap_or_default();
                let mut by_key = BTreeMap::new();
                let mut global = None;
                for entry in 0..len {
                    let entry_key = NodeKey::entry(id, variable, entry);
                    self.ensure_fresh(entry_key).map_err(core)?;
                    if let Some(node) = self.nodes.get(&entry_key) {
                        if let Some(inputs) = &node.inputs {
                            by_key.insert(entry, inputs.clone());
                        }
                        if global.is_none() {
                            global = node.global.clone();
                        }
                    }
                }
                let global = global.unwrap_or_default();
                let instructions = inverse(&mut ArrayInverseContext {
                    desired: &merged,
                    current: &current,
                    shape: &shape,
                    global: &global.values,
                    workspace: transaction.workspace((id, variable)),
                    by_key: &by_key,
                })
                .map_err(|message| fail(InverseFailureReason::Rejected(message)))?;
                let routing = Routing {
                    scalar: None,
                    global: Some(global.as_ref()),
                    by_key: &by_key,
                };
                self.apply_instructions(id, variable, &label, instructions, &routing, transaction, depth)
            }
        }
    }

    fn is_fixed(&mut self, id: ComponentId, def: &StateVarDef) -> Result<bool, CoreError> {
        if def.name == "fixed" {
            return Ok(false);
        }
        let Some(fixed) = self.components.get(id).and_then(|c| c.vars.id_of("fixed")) else {
            return Ok(false);
        };
        let value = self.resolve_node(NodeKey::whole(id, fixed))?;
        Ok(value.as_bool() == Some(true))
    }

    /// Stage essential writes and recurse into producers, one inversion per
    /// producer variable with all its desired entries merged.
    #[allow(clippy::too_many_arguments)]
    fn apply_instructions(
        &mut self,
        id: ComponentId,
        variable: VarId,
        label: &str,
        instructions: Vec<InverseInstruction>,
        routing: &Routing<'_>,
        transaction: &mut Transaction,
        depth: usize,
    ) -> Result<(), InverseFailure> {
        let mut pending: IndexMap<(ComponentId, VarId), Desired> = IndexMap::new();
        for instruction in instructions {
            match instruction {
                InverseInstruction::SetEssential(value) => transaction.stage_whole((id, variable), value),
                InverseInstruction::SetEssentialEntries(entries) => {
                    transaction.stage_entries((id, variable), entries)
                }
                InverseInstruction::SetDependency {
                    dependency,
                    desired,
                    key,
                    child,
                } => {
                    let inputs = match key {
                        Some(key) => routing.by_key.get(&key).map(|inputs| inputs.as_ref()),
                        None => routing.scalar,
                    };
                    let binding = inputs
                        .and_then(|inputs| inputs.binding(dependency))
                        .or_else(|| routing.global.and_then(|global| global.binding(dependency)));
                    let producer = match binding {
                        Some(Binding::Node(node)) => Some(*node),
                        Some(Binding::Children(children)) => {
                            children.get(child.unwrap_or(0)).and_then(|(_, node)| *node)
                        }
                        Some(Binding::Unbound) | None => None,
                    };
                    let Some(producer) = producer else {
                        return Err(InverseFailure::new(
                            label,
                            InverseFailureReason::MissingDependency(dependency.to_string()),
                        ));
                    };
                    let next = match producer.part {
                        NodePart::Whole => Desired::Whole(desired),
                        NodePart::Entry(entry) => Desired::Entries(BTreeMap::from([(entry, desired)])),
                        NodePart::Size => {
                            return Err(InverseFailure::new(label, InverseFailureReason::NotInvertible));
                        }
                    };
                    match pending.get_mut(&producer.var()) {
                        Some(Desired::Entries(existing)) if matches!(next, Desired::Entries(_)) => {
                            if let Desired::Entries(more) = next {
                                existing.extend(more);
                            }
                        }
                        _ => {
                            pending.insert(producer.var(), next);
                        }
                    }
                }
            }
        }
        for ((component, producer_variable), desired) in pending {
            self.invert(component, producer_variable, desired, transaction, depth + 1)?;
        }
        Ok(())
    }
}
