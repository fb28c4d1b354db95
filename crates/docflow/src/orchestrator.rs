//! Updates: value requests, actions and what they report back.
//!
//! A batch of requests is inverted into staged essential writes. Only if
//! every request inverts cleanly are the writes committed; the document
//! then settles (composites re-expand) and the requested variables are
//! read back as their actual values. A cycle surfacing while settling
//! rolls the writes back.

use crate::catalog::ActionContext;
use crate::composite::ReplacementEvent;
use crate::document::DocumentCore;
use crate::engine::address::{NodeKey, NodePart, VarId};
use crate::engine::arena::ComponentId;
use crate::engine::snapshot::EssentialSnapshot;
use crate::error::{CoreError, InverseFailure, InverseFailureReason};
use crate::resolver::{Desired, EssentialWrite, Transaction};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use ulid::Ulid;

/// "Set this variable to this value." The variable may be an entry alias
/// such as `x2`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRequest {
    pub component: ComponentId,
    pub variable: String,
    pub value: Value,
}

impl ValueRequest {
    pub fn new(component: ComponentId, variable: &str, value: Value) -> Self {
        Self {
            component,
            variable: variable.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Intermediate update (typing, dragging): applied like any other but
    /// left out of the history.
    pub transient: bool,
    pub label: Option<String>,
}

impl UpdateOptions {
    pub fn transient() -> Self {
        Self {
            transient: true,
            label: None,
        }
    }

    pub fn labelled(label: &str) -> Self {
        Self {
            transient: false,
            label: Some(label.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableValue {
    pub component: String,
    pub variable: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub failure: Option<InverseFailure>,
    /// Requested variables as they ended up, which may differ from what
    /// was asked for.
    pub actual_values: Vec<VariableValue>,
    /// Renderer variables whose value changed. Empty until renderer
    /// tracking is switched on with `resolve_renderer_state`.
    pub changed: Vec<VariableValue>,
    pub replacement_changes: Vec<ReplacementEvent>,
}

impl UpdateOutcome {
    pub fn actual(&self, component: &str, variable: &str) -> Option<&Value> {
        self.actual_values
            .iter()
            .rev()
            .find(|entry| entry.component == component && entry.variable == variable)
            .map(|entry| &entry.value)
    }

    fn absorb(&mut self, chained: UpdateOutcome) {
        self.actual_values.extend(chained.actual_values);
        for change in chained.changed {
            self.changed
                .retain(|known| !(known.component == change.component && known.variable == change.variable));
            self.changed.push(change);
        }
        self.replacement_changes.extend(chained.replacement_changes);
    }
}

/// A committed, non-transient update.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Ulid,
    pub label: String,
    pub writes: Vec<EssentialWrite>,
}

impl DocumentCore {
    pub fn request_value(
        &mut self,
        component: &str,
        variable: &str,
        value: Value,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome, CoreError> {
        let id = self.require_component(component)?;
        self.request_values(vec![ValueRequest::new(id, variable, value)], options)
    }

    /// Process a batch of requests as one update.
    ///
    /// Unknown components or variables are errors; a request that cannot
    /// be honored is not, it is reported in the outcome and nothing is
    /// written.
    pub fn request_values(
        &mut self,
        requests: Vec<ValueRequest>,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome, CoreError> {
        let mut grouped: IndexMap<(ComponentId, VarId), Desired> = IndexMap::new();
        let mut targets: Vec<(NodeKey, String)> = Vec::new();
        for request in requests {
            let key = self.address_key(request.component, &request.variable)?;
            targets.push((key, request.variable));
            let desired = match key.part {
                NodePart::Entry(entry) => Desired::Entries(BTreeMap::from([(entry, request.value)])),
                NodePart::Whole | NodePart::Size => Desired::Whole(request.value),
            };
            match grouped.get_mut(&key.var()) {
                Some(Desired::Entries(existing)) if matches!(desired, Desired::Entries(_)) => {
                    if let Desired::Entries(more) = desired {
                        existing.extend(more);
                    }
                }
                _ => {
                    grouped.insert(key.var(), desired);
                }
            }
        }

        let mut transaction = Transaction::new();
        let mut failure = None;
        for ((id, variable), desired) in grouped {
            if let Err(error) = self.invert(id, variable, desired, &mut transaction, 0) {
                failure = Some(error);
                break;
            }
        }
        let mut writes = match &failure {
            None => self.commit(transaction),
            Some(error) => {
                self.log_failure(error);
                Vec::new()
            }
        };

        let actual_values = match self.settle().and_then(|()| self.read_targets(&targets)) {
            Ok(values) => values,
            Err(error) if error.is_cycle() && !writes.is_empty() => {
                self.rollback(&writes);
                writes.clear();
                let node = targets.first().map(|(key, _)| self.label(*key)).unwrap_or_default();
                let error = InverseFailure::new(node, InverseFailureReason::Core(error));
                self.log_failure(&error);
                failure = Some(error);
                self.settle()?;
                self.read_targets(&targets)?
            }
            Err(error) => return Err(error),
        };

        if failure.is_none() && !options.transient && !writes.is_empty() {
            let label = options.label.clone().unwrap_or_else(|| {
                targets
                    .iter()
                    .map(|(key, _)| self.label(*key))
                    .collect::<Vec<_>>()
                    .join(", ")
            });
            self.history.push(HistoryEntry {
                id: Ulid::new(),
                label,
                writes,
            });
        }

        Ok(UpdateOutcome {
            success: failure.is_none(),
            failure,
            actual_values,
            changed: self.renderer_changes()?,
            replacement_changes: std::mem::take(&mut self.replacement_events),
        })
    }

    fn log_failure(&self, failure: &InverseFailure) {
        if self.config.diagnostics.log_inversion_failures {
            log::warn!("{failure}");
        } else {
            log::debug!("{failure}");
        }
    }

    fn read_targets(&mut self, targets: &[(NodeKey, String)]) -> Result<Vec<VariableValue>, CoreError> {
        let mut values = Vec::with_capacity(targets.len());
        for (key, variable) in targets {
            if !self.components.is_valid(key.component) {
                continue;
            }
            values.push(VariableValue {
                component: self.name_of(key.component),
                variable: variable.clone(),
                value: self.resolve_node(*key)?,
            });
        }
        Ok(values)
    }

    /// Run a component action. Chained steps run after the main requests
    /// whether or not those succeeded, so an input can snap back to the
    /// value that actually stuck.
    pub fn perform_action(
        &mut self,
        component: &str,
        action: &str,
        args: Value,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome, CoreError> {
        let id = self.require_component(component)?;
        let def = self
            .components
            .get(id)
            .and_then(|c| c.ty.actions.get(action).cloned())
            .ok_or_else(|| CoreError::UnknownAction {
                component: component.to_string(),
                action: action.to_string(),
            })?;
        let mut reads = IndexMap::new();
        for read in &def.reads {
            reads.insert(read.to_string(), self.resolve_id(id, read)?);
        }
        let plan = (def.handler)(&ActionContext {
            component: id,
            args: &args,
            reads: &reads,
        })
        .map_err(|message| CoreError::InvalidActionArguments {
            action: action.to_string(),
            message,
        })?;
        log::debug!("{component}.{action}: {} request(s)", plan.requests.len());

        let options = UpdateOptions {
            transient: plan.transient.unwrap_or(options.transient),
            label: Some(
                options
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("{component}.{action}")),
            ),
        };
        let mut outcome = self.request_values(plan.requests, &options)?;
        for step in plan.chain {
            let value = self.resolve_id(step.source.0, &step.source.1)?;
            let chained = self.request_values(vec![ValueRequest::new(step.target.0, &step.target.1, value)], &options)?;
            if let Some(failure) = &chained.failure {
                log::debug!("chained update failed: {failure}");
            }
            outcome.absorb(chained);
        }
        Ok(outcome)
    }

    /// Resolve every renderer variable of the active tree and start
    /// reporting renderer changes in update outcomes.
    pub fn resolve_renderer_state(&mut self) -> Result<Vec<VariableValue>, CoreError> {
        let values = self.renderer_values()?;
        self.renderer_baseline = Some(values.iter().map(|(key, value)| (*key, value.clone())).collect());
        Ok(values
            .into_iter()
            .map(|(key, value)| self.variable_value(key, value))
            .collect())
    }

    fn renderer_values(&mut self) -> Result<Vec<(NodeKey, Value)>, CoreError> {
        let mut values = Vec::new();
        let mut queue = vec![self.root];
        while let Some(id) = queue.pop() {
            let Some(component) = self.components.get(id) else {
                continue;
            };
            let renderer_vars: Vec<VarId> = component
                .vars
                .iter()
                .filter(|(_, def)| def.for_renderer)
                .map(|(variable, _)| variable)
                .collect();
            for variable in renderer_vars {
                let key = NodeKey::whole(id, variable);
                values.push((key, self.resolve_node(key)?));
            }
            let mut producers: Vec<NodeKey> = Vec::new();
            let children = self.active_children(id, &mut producers)?;
            queue.extend(children.into_iter().rev());
        }
        Ok(values)
    }

    fn renderer_changes(&mut self) -> Result<Vec<VariableValue>, CoreError> {
        if self.renderer_baseline.is_none() {
            return Ok(Vec::new());
        }
        let current = self.renderer_values()?;
        let mut changed = Vec::new();
        let mut baseline = IndexMap::with_capacity(current.len());
        for (key, value) in current {
            let previous = self.renderer_baseline.as_ref().and_then(|known| known.get(&key));
            if previous.is_none_or(|previous| !previous.same_as(&value)) {
                changed.push(self.variable_value(key, value.clone()));
            }
            baseline.insert(key, value);
        }
        self.renderer_baseline = Some(baseline);
        Ok(changed)
    }

    fn variable_value(&self, key: NodeKey, value: Value) -> VariableValue {
        let variable = self
            .components
            .get(key.component)
            .map_or("?", |component| component.vars.name_of(key.variable))
            .to_string();
        VariableValue {
            component: self.name_of(key.component),
            variable,
            value,
        }
    }

    /// Committed non-transient updates, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Every written essential value, by component name.
    pub fn snapshot_essential(&self) -> EssentialSnapshot {
        let mut snapshot = EssentialSnapshot::new();
        for id in self.components.ids() {
            let Some(component) = self.components.get(id) else {
                continue;
            };
            for (variable, value) in &component.essential {
                snapshot.insert(&component.name, variable, value.clone());
            }
        }
        snapshot
    }

    /// Write a snapshot's essential values back. Entries for components or
    /// variables that no longer exist are skipped.
    pub fn restore_essential(&mut self, snapshot: &EssentialSnapshot) -> Result<UpdateOutcome, CoreError> {
        let mut transaction = Transaction::new();
        let mut skipped = 0;
        for (name, variables) in &snapshot.components {
            let Some(id) = self.names.get(name) else {
                skipped += variables.len();
                continue;
            };
            for (variable, value) in variables {
                match self.components.get(id).and_then(|c| c.vars.id_of(variable)) {
                    Some(variable) => transaction.stage_whole((id, variable), value.clone()),
                    None => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            log::debug!("restore skipped {skipped} essential value(s)");
        }
        let writes = self.commit(transaction);
        self.settle()?;
        log::debug!("restored {} essential value(s)", writes.len());
        Ok(UpdateOutcome {
            success: true,
            failure: None,
            actual_values: Vec::new(),
            changed: self.renderer_changes()?,
            replacement_changes: std::mem::take(&mut self.replacement_events),
        })
    }
}
