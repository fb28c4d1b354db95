//! Engine primitives shared by the resolver, the composite expander and
//! the orchestrator.

pub mod address;
pub mod arena;
pub mod diagnostics;
pub mod routing;
pub mod snapshot;
pub mod tick;
