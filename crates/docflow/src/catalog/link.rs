//! Pass-through definitions for linked replacements.

use crate::component::serialized::LinkTarget;
use crate::statevar::array::ArrayDef;
use crate::statevar::dependency::{ComponentTarget, Dependency, DependencySpec, VarSelector};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::{Definition, StateVarDef};

pub(super) fn linked_scalar(primary: &str, link: &LinkTarget) -> StateVarDef {
    let target = ComponentTarget::Id(link.component);
    let variable = VarSelector::Named(link.variable.clone());
    let source = match link.key {
        Some(key) => Dependency::array_entry(target, variable, key),
        None => Dependency::state_var(target, variable),
    };
    StateVarDef::scalar(primary)
        .for_renderer()
        .dependencies(move |_| DependencySpec::new().with("source", source.clone()))
        .definition(|deps| Definition::value(deps.value("source").clone()))
        .inverse(|ctx| Ok(vec![InverseInstruction::dependency("source", ctx.desired.clone())]))
}

pub(super) fn linked_array(primary: &str, link: &LinkTarget) -> StateVarDef {
    let component = link.component;
    let size_variable = link.variable.clone();
    let entry_variable = link.variable.clone();
    let array = ArrayDef::new(1)
        .size_dependencies(move |_| {
            DependencySpec::new().with(
                "size",
                Dependency::array_size(ComponentTarget::Id(component), VarSelector::Named(size_variable.clone())),
            )
        })
        .size(|deps| deps.shape("size"))
        .dependencies_by_key(move |key, _, _| {
            DependencySpec::new().with(
                "source",
                Dependency::array_entry(
                    ComponentTarget::Id(component),
                    VarSelector::Named(entry_variable.clone()),
                    key,
                ),
            )
        })
        .definition_by_key(|entry| Definition::value(entry.dependencies.value("source").clone()))
        .inverse_by_key(|ctx| {
            Ok(ctx
                .desired
                .iter()
                .map(|(key, value)| InverseInstruction::keyed("source", *key, value.clone()))
                .collect())
        });
    StateVarDef::array(primary, array).for_renderer()
}
