//! Math expression trees.
//!
//! The document core treats expressions as opaque values: it compares them
//! structurally, slices tuple components out of them and asks for a numeric
//! value when a component needs one. Everything else lives here.

mod expr;
mod parser;
mod report;

pub use expr::{BinaryOp, Expr};
pub use parser::{ParseError, Span, parse};
pub use report::report_parse_errors;
