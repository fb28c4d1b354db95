use serde::Serialize;
use std::fmt;

/// Failures that abort a single read or action. Authoring problems are not
/// errors: they become sentinel values plus a recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CoreError {
    UnknownComponent(String),
    UnknownStateVariable { component: String, variable: String },
    UnknownAction { component: String, action: String },
    /// A state variable was re-entered while it was being resolved.
    /// `path` lists `component.variable` from the outermost read inwards.
    Cycle { path: Vec<String> },
    InvalidActionArguments { action: String, message: String },
    Configuration(String),
    ExpansionLimit { rounds: usize },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownComponent(name) => write!(f, "no component named '{name}'"),
            Self::UnknownStateVariable { component, variable } => {
                write!(f, "component '{component}' has no state variable '{variable}'")
            }
            Self::UnknownAction { component, action } => {
                write!(f, "component '{component}' has no action '{action}'")
            }
            Self::Cycle { path } => write!(f, "circular dependency: {}", path.join(" -> ")),
            Self::InvalidActionArguments { action, message } => {
                write!(f, "invalid arguments for '{action}': {message}")
            }
            Self::Configuration(message) => write!(f, "{message}"),
            Self::ExpansionLimit { rounds } => {
                write!(f, "composite expansion did not settle after {rounds} rounds")
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InverseFailureReason {
    /// Neither an inverse definition nor an essential slot accepts writes.
    NotInvertible,
    /// The owning component resolves `fixed` to true.
    Fixed,
    NoSuchArrayKey(usize),
    /// The inverse definition itself declined the desired value.
    Rejected(String),
    MissingDependency(String),
    DepthExceeded,
    Core(CoreError),
}

/// Why an inversion failed and at which `component.variable` it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InverseFailure {
    pub reason: InverseFailureReason,
    pub node: String,
}

impl InverseFailure {
    pub fn new(node: impl Into<String>, reason: InverseFailureReason) -> Self {
        Self {
            reason,
            node: node.into(),
        }
    }
}

impl fmt::Display for InverseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot set {}: ", self.node)?;
        match &self.reason {
            InverseFailureReason::NotInvertible => write!(f, "value is not settable"),
            InverseFailureReason::Fixed => write!(f, "component is fixed"),
            InverseFailureReason::NoSuchArrayKey(key) => write!(f, "no array entry {key}"),
            InverseFailureReason::Rejected(message) => write!(f, "{message}"),
            InverseFailureReason::MissingDependency(name) => {
                write!(f, "dependency '{name}' is not available")
            }
            InverseFailureReason::DepthExceeded => write!(f, "inverse chain too deep"),
            InverseFailureReason::Core(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for InverseFailure {}
