//! Reactive state-variable engine for interactive math documents.
//!
//! A document is a tree of components. Each component exposes state
//! variables whose values are computed lazily from declared dependencies,
//! pushed back through inverse definitions when a user edits them, and
//! remembered in essential slots where an edit comes to rest. Composite
//! components stand in for generated replacement subtrees that are kept in
//! sync with the values they depend on.
//!
//! ```ignore
//! let root = SerializedComponent::new("document")
//!     .child(SerializedComponent::new("number").named("n").text("37/3"));
//! let mut core = DocumentCore::with_config(&root, &CoreConfig::default())?;
//! assert_eq!(core.resolve("n", "isInteger")?, Value::Bool(false));
//! ```

pub mod catalog;
pub mod component;
pub mod composite;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod orchestrator;
mod resolver;
pub mod rounding;
pub mod service;
pub mod statevar;
pub mod value;

pub use catalog::{ActionContext, ActionDef, ActionPlan, ChainStep, ComponentCatalog, ComponentType};
pub use component::serialized::{SerializedAttribute, SerializedComponent, SerializedNode, SerializedReference};
pub use composite::{CompositeDef, ExpansionContext, ReplacementChange, ReplacementEvent};
pub use config::{ConfigError, CoreConfig};
pub use document::DocumentCore;
pub use engine::diagnostics::{Diagnostic, Severity, SourcePosition, render_diagnostics};
pub use engine::snapshot::EssentialSnapshot;
pub use error::{CoreError, InverseFailure, InverseFailureReason};
pub use orchestrator::{HistoryEntry, UpdateOptions, UpdateOutcome, ValueRequest, VariableValue};
pub use resolver::EssentialWrite;
pub use service::{CoreHandle, CoreWorker, ServiceError};
pub use value::Value;

pub use docflow_expr;
