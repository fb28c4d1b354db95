//! Diagnostics: the author-facing warning channel, change tracing for
//! "why did X change?" queries, and evaluation counters.

use super::address::NodeKey;
use super::tick::Revision;
use ariadne::{Config, Label, Report, ReportKind, Source};
use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Byte range of a component in the markup it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Name of the component the diagnostic is attached to, if any.
    pub component: Option<String>,
    pub position: Option<SourcePosition>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            component: None,
            position: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(message)
        }
    }

    pub fn at(mut self, component: Option<String>, position: Option<SourcePosition>) -> Self {
        self.component = component;
        self.position = position;
        self
    }
}

/// Accumulated diagnostics. Re-evaluating a broken node reports the same
/// problem again; the log keeps one copy.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: IndexSet<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if !self.entries.contains(&diagnostic) {
            log::debug!("diagnostic: {}", diagnostic.message);
            self.entries.insert(diagnostic);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }
}

/// Renders diagnostics against the markup source they point into.
/// Diagnostics without a position are listed as plain lines.
pub fn render_diagnostics<'a>(
    diagnostics: impl IntoIterator<Item = &'a Diagnostic>,
    filename: &str,
    source_code: &str,
) -> String {
    let mut rendered = String::new();
    for diagnostic in diagnostics {
        let kind = match diagnostic.severity {
            Severity::Warning => ReportKind::Warning,
            Severity::Error => ReportKind::Error,
        };
        let Some(position) = diagnostic.position.filter(|p| p.end <= source_code.len()) else {
            rendered.push_str(&format!("{kind}: {}\n", diagnostic.message));
            continue;
        };
        let range = position.start..position.end;
        let mut report_bytes = Cursor::new(Vec::new());
        let label = diagnostic.component.as_deref().unwrap_or("here");
        let written = Report::build(kind, (filename, range.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(&diagnostic.message)
            .with_label(Label::new((filename, range)).with_message(label))
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => rendered.push_str(&String::from_utf8_lossy(report_bytes.get_ref())),
            Err(_) => rendered.push_str(&format!("{kind}: {}\n", diagnostic.message)),
        }
    }
    rendered
}

/// One actual value change.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub node: NodeKey,
    /// `component.variable` for display
    pub label: String,
    pub revision: Revision,
    /// Producers whose own change caused the recomputation.
    /// Empty for essential writes.
    pub triggered_by: SmallVec<[NodeKey; 4]>,
}

/// Latest change per node, populated when change tracing is on.
#[derive(Debug, Default)]
pub struct ChangeLog {
    latest: FxHashMap<NodeKey, ChangeRecord>,
}

impl ChangeLog {
    pub fn record(&mut self, record: ChangeRecord) {
        self.latest.insert(record.node, record);
    }

    pub fn why_did_change(&self, node: &NodeKey) -> Option<&ChangeRecord> {
        self.latest.get(node)
    }

    /// The change of `node` followed back through everything that caused it.
    pub fn change_chain(&self, node: &NodeKey) -> Vec<&ChangeRecord> {
        let mut chain = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = vec![*node];
        while let Some(current) = queue.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(record) = self.latest.get(&current) {
                queue.extend(record.triggered_by.iter().copied());
                chain.push(record);
            }
        }
        chain
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

/// Evaluation counters.
#[derive(Debug, Default, Clone)]
pub struct EvalStats {
    definitions: FxHashMap<NodeKey, u32>,
    total_definitions: u64,
    pub expansions: u64,
    pub inversions: u64,
}

impl EvalStats {
    pub fn record_definition(&mut self, node: NodeKey) {
        *self.definitions.entry(node).or_default() += 1;
        self.total_definitions += 1;
    }

    /// Definition calls for one node since the last reset.
    pub fn definitions_of(&self, node: &NodeKey) -> u32 {
        self.definitions.get(node).copied().unwrap_or(0)
    }

    pub fn total_definitions(&self) -> u64 {
        self.total_definitions
    }

    /// Nodes whose definition ran since the last reset.
    pub fn evaluated_nodes(&self) -> impl Iterator<Item = &NodeKey> {
        self.definitions.keys()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::address::VarId;
    use crate::engine::arena::ComponentId;

    fn key(index: u32) -> NodeKey {
        NodeKey::whole(
            ComponentId {
                index,
                generation: 0,
            },
            VarId(0),
        )
    }

    #[test]
    fn log_deduplicates() {
        let mut log = DiagnosticLog::new();
        log.push(Diagnostic::warning("bad length"));
        log.push(Diagnostic::warning("bad length"));
        log.push(Diagnostic::error("cycle"));
        assert_eq!(log.len(), 2);
        assert!(log.has_errors());
        assert_eq!(log.warnings().count(), 1);
    }

    #[test]
    fn change_chain_follows_triggers() {
        let mut changes = ChangeLog::default();
        changes.record(ChangeRecord {
            node: key(1),
            label: "a.value".into(),
            revision: Revision(1),
            triggered_by: SmallVec::new(),
        });
        changes.record(ChangeRecord {
            node: key(2),
            label: "b.value".into(),
            revision: Revision(1),
            triggered_by: SmallVec::from_slice(&[key(1)]),
        });
        let chain = changes.change_chain(&key(2));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].label, "a.value");
    }

    #[test]
    fn renders_positioned_warning() {
        let source = "<sequence length=\"a+\"/>";
        let diagnostic = Diagnostic::warning("invalid length").at(
            Some("s".into()),
            Some(SourcePosition { start: 0, end: source.len() }),
        );
        let rendered = render_diagnostics([&diagnostic], "doc.xml", source);
        assert!(rendered.contains("invalid length"));

        let unplaced = Diagnostic::warning("somewhere");
        assert_eq!(render_diagnostics([&unplaced], "doc.xml", source), "Warning: somewhere\n");
    }

    #[test]
    fn stats_count_per_node() {
        let mut stats = EvalStats::default();
        stats.record_definition(key(1));
        stats.record_definition(key(1));
        assert_eq!(stats.definitions_of(&key(1)), 2);
        assert_eq!(stats.definitions_of(&key(2)), 0);
        stats.reset();
        assert_eq!(stats.total_definitions(), 0);
    }
}
