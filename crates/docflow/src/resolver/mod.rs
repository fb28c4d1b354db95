//! The state-variable store and the evaluators that keep it consistent.
//!
//! Nodes are resolved lazily. A write marks the directly affected nodes
//! `Dirty` and everything downstream `Check`; a `Check` node re-runs its
//! definition only if one of its producers actually changed since it was
//! last verified, so unchanged recomputations stop the cascade.

mod forward;
mod graph;
mod inverse;
mod transaction;

pub(crate) use inverse::Desired;
pub use transaction::EssentialWrite;
pub(crate) use transaction::Transaction;

use crate::engine::address::NodeKey;
use crate::engine::tick::Revision;
use crate::statevar::dependency::DependencySpec;
use crate::statevar::values::{DeterminingValues, ResolvedInputs};
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    Fresh,
    /// A producer may have changed.
    Check,
    /// Must recompute.
    Dirty,
    /// On the resolution stack; reading it again is a cycle.
    Resolving,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub status: NodeStatus,
    /// False until the first computation is stored.
    pub computed: bool,
    pub value: Value,
    pub used_default: bool,
    pub changed_at: Revision,
    pub verified_at: Revision,
    pub producers: SmallVec<[NodeKey; 4]>,
    pub inputs: Option<Arc<ResolvedInputs>>,
    /// Global dependencies, for array entries.
    pub global: Option<Arc<ResolvedInputs>>,
    pub determining: Option<DeterminingValues>,
    pub spec: Option<Arc<DependencySpec>>,
    pub global_spec: Option<Arc<DependencySpec>>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            status: NodeStatus::Dirty,
            computed: false,
            value: Value::Null,
            used_default: false,
            changed_at: Revision::ZERO,
            verified_at: Revision::ZERO,
            producers: SmallVec::new(),
            inputs: None,
            global: None,
            determining: None,
            spec: None,
            global_spec: None,
        }
    }
}
