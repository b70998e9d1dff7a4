//! Patch applicator - executes one operation against every node it matches
//!
//! Each call:
//! - Resolves the operation's query (an empty result is a warning, not an error)
//! - Performs the structural or attribute edit on every match
//! - Marks the edited node and its ancestor chain for preservation, limited to
//!   the region the pruner will inspect

use crate::patch::preserve::{DepthBound, PreservationMarks};
use crate::patch::schema::{Operation, Order, Template};
use crate::query::{QueryError, QueryResolver};
use crate::tree::{Document, NodeId};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid query '{xpath}' in {class} operation: {source}")]
    Query {
        class: String,
        xpath: String,
        #[source]
        source: QueryError,
    },
}

/// Non-fatal problem with a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub class: String,
    pub xpath: String,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The query matched nothing.
    NoMatch,
    /// The operation class is unknown.
    UnsupportedClass { suggestion: Option<&'static str> },
    /// `Insert`, `Remove` and `Replace` need a parent; the root has none.
    RootNotEditable,
    /// `Add` and the attribute operations only apply to elements.
    NotAnElement,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::NoMatch => {
                write!(f, "{} '{}' matched no nodes", self.class, self.xpath)
            }
            DiagnosticKind::UnsupportedClass { suggestion } => {
                write!(f, "unsupported operation class '{}'", self.class)?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean '{suggestion}'?)")?;
                }
                Ok(())
            }
            DiagnosticKind::RootNotEditable => write!(
                f,
                "{} '{}' targets the document root, which cannot be moved or removed",
                self.class, self.xpath
            ),
            DiagnosticKind::NotAnElement => write!(
                f,
                "{} '{}' matched a text or comment node",
                self.class, self.xpath
            ),
        }
    }
}

/// What one operation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationReport {
    pub matched: usize,
    pub changed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct PatchApplier<'r, R: QueryResolver + ?Sized> {
    resolver: &'r R,
    bound: DepthBound,
}

impl<'r, R: QueryResolver + ?Sized> PatchApplier<'r, R> {
    pub fn new(resolver: &'r R, bound: DepthBound) -> Self {
        Self { resolver, bound }
    }

    pub fn bound(&self) -> DepthBound {
        self.bound
    }

    /// Apply one operation to `document`, recording marks in `marks`.
    ///
    /// Only a malformed query is an error. Empty matches and unsupported
    /// classes come back as diagnostics in the report.
    pub fn apply(
        &self,
        document: &mut Document,
        marks: &mut PreservationMarks,
        operation: &Operation,
    ) -> Result<OperationReport, ApplyError> {
        let mut report = OperationReport::default();

        if let Operation::Unsupported { class, .. } = operation {
            let suggestion = suggest_class(class);
            report.diagnostics.push(self.diagnose(
                operation,
                DiagnosticKind::UnsupportedClass { suggestion },
            ));
            return Ok(report);
        }

        let matches = self
            .resolver
            .resolve(document, operation.xpath())
            .map_err(|source| ApplyError::Query {
                class: operation.class().to_string(),
                xpath: operation.xpath().to_string(),
                source,
            })?;

        report.matched = matches.len();
        if matches.is_empty() {
            report
                .diagnostics
                .push(self.diagnose(operation, DiagnosticKind::NoMatch));
            return Ok(report);
        }

        for node in matches {
            // An earlier match of this same operation may have removed it.
            if !document.is_attached(node) {
                continue;
            }
            match self.apply_to(document, marks, operation, node) {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(kind) => report.diagnostics.push(self.diagnose(operation, kind)),
            }
        }

        debug!(
            class = operation.class(),
            xpath = operation.xpath(),
            matched = report.matched,
            changed = report.changed,
            "applied operation"
        );
        Ok(report)
    }

    fn diagnose(&self, operation: &Operation, kind: DiagnosticKind) -> Diagnostic {
        let diagnostic = Diagnostic {
            class: operation.class().to_string(),
            xpath: operation.xpath().to_string(),
            kind,
        };
        warn!("{diagnostic}");
        diagnostic
    }

    /// Returns whether the document changed.
    fn apply_to(
        &self,
        document: &mut Document,
        marks: &mut PreservationMarks,
        operation: &Operation,
        node: NodeId,
    ) -> Result<bool, DiagnosticKind> {
        let bound = self.bound;
        let is_root = node == document.root();

        match operation {
            Operation::Add { order, value, .. } => {
                if !document.is_element(node) {
                    return Err(DiagnosticKind::NotAnElement);
                }
                let imported = import_all(document, value);
                if *order == Some(Order::Prepend) {
                    for id in imported.iter().rev() {
                        document.prepend_child(node, *id);
                    }
                } else {
                    for id in &imported {
                        document.append_child(node, *id);
                    }
                }
                for id in &imported {
                    marks.mark_within(document, *id, bound);
                }
                marks.mark_ancestors(document, Some(node), bound);
                Ok(!imported.is_empty())
            }
            Operation::Insert { order, value, .. } => {
                if is_root {
                    return Err(DiagnosticKind::RootNotEditable);
                }
                let imported = import_all(document, value);
                let mut anchor = node;
                for id in &imported {
                    let placed = if *order == Some(Order::Append) {
                        let placed = document.insert_after(anchor, *id);
                        anchor = *id;
                        placed
                    } else {
                        document.insert_before(node, *id)
                    };
                    placed.map_err(|_| DiagnosticKind::RootNotEditable)?;
                }
                for id in &imported {
                    marks.mark_within(document, *id, bound);
                }
                marks.mark_ancestors(document, document.parent(node), bound);
                Ok(!imported.is_empty())
            }
            Operation::Remove { .. } => {
                let parent = document.parent(node);
                document
                    .detach(node)
                    .map_err(|_| DiagnosticKind::RootNotEditable)?;
                marks.mark_ancestors(document, parent, bound);
                Ok(true)
            }
            Operation::Replace { value, .. } => {
                if is_root {
                    return Err(DiagnosticKind::RootNotEditable);
                }
                let Some(first) = value.first() else {
                    return Ok(false);
                };
                let replacement = document.import(value.document(), first);
                document
                    .replace(node, replacement)
                    .map_err(|_| DiagnosticKind::RootNotEditable)?;
                marks.mark_within(document, replacement, bound);
                marks.mark_ancestors(document, document.parent(replacement), bound);
                Ok(true)
            }
            Operation::AttributeAdd {
                attribute, value, ..
            } => {
                let element = document
                    .element_mut(node)
                    .ok_or(DiagnosticKind::NotAnElement)?;
                if element.has_attribute(attribute) {
                    return Ok(false);
                }
                element.set_attribute(attribute.as_str(), value.as_str());
                self.mark_edited(document, marks, node);
                Ok(true)
            }
            Operation::AttributeSet {
                attribute, value, ..
            } => {
                let element = document
                    .element_mut(node)
                    .ok_or(DiagnosticKind::NotAnElement)?;
                element.set_attribute(attribute.as_str(), value.as_str());
                self.mark_edited(document, marks, node);
                Ok(true)
            }
            Operation::AttributeRemove { attribute, .. } => {
                let element = document
                    .element_mut(node)
                    .ok_or(DiagnosticKind::NotAnElement)?;
                let removed = element.remove_attribute(attribute).is_some();
                self.mark_edited(document, marks, node);
                Ok(removed)
            }
            Operation::Unsupported { .. } => Ok(false),
        }
    }

    fn mark_edited(&self, document: &Document, marks: &mut PreservationMarks, node: NodeId) {
        marks.mark_within(document, node, self.bound);
        marks.mark_ancestors(document, document.parent(node), self.bound);
    }
}

fn import_all(document: &mut Document, template: &Template) -> Vec<NodeId> {
    template
        .nodes()
        .iter()
        .map(|id| document.import(template.document(), *id))
        .collect()
}

/// Closest known class name, tolerating a `PatchOperation` prefix.
fn suggest_class(class: &str) -> Option<&'static str> {
    let bare = class.strip_prefix("PatchOperation").unwrap_or(class);
    Operation::CLASSES
        .iter()
        .map(|candidate| {
            let score = strsim::normalized_levenshtein(
                &bare.to_ascii_lowercase(),
                &candidate.to_ascii_lowercase(),
            );
            (*candidate, score)
        })
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PathResolver;
    use crate::tree::{parse, to_string, WriteOptions};

    fn template(xml: &str) -> Template {
        let source = parse(&format!("<value>{xml}</value>")).unwrap();
        Template::from_children(&source, source.root())
    }

    fn run(input: &str, bound: DepthBound, operations: &[Operation]) -> (Document, PreservationMarks, Vec<OperationReport>) {
        let mut document = parse(input).unwrap();
        let mut marks = PreservationMarks::new();
        let applier = PatchApplier::new(&PathResolver, bound);
        let reports = operations
            .iter()
            .map(|op| applier.apply(&mut document, &mut marks, op).unwrap())
            .collect();
        (document, marks, reports)
    }

    fn xml(document: &Document) -> String {
        to_string(document, &WriteOptions::compact()).unwrap()
    }

    fn marked_names(document: &Document, marks: &PreservationMarks) -> Vec<String> {
        document
            .nodes()
            .filter(|id| marks.is_marked(*id))
            .filter_map(|id| document.name(id).map(str::to_string))
            .collect()
    }

    #[test]
    fn add_appends_by_default_and_prepends_on_request() {
        let ops = [
            Operation::Add {
                xpath: "/Root/A".into(),
                order: None,
                value: template("<x/><y/>"),
            },
            Operation::Add {
                xpath: "/Root/A".into(),
                order: Some(Order::Prepend),
                value: template("<p/><q/>"),
            },
        ];
        let (doc, marks, _) = run("<Root><A><old/></A></Root>", DepthBound::Limited(1), &ops);
        assert_eq!(xml(&doc), "<Root><A><p/><q/><old/><x/><y/></A></Root>");
        assert_eq!(marked_names(&doc, &marks), ["Root", "A", "p", "q", "x", "y"]);
    }

    #[test]
    fn add_under_text_node_is_rejected() {
        let op = Operation::Add {
            xpath: "/Root/A/text()".into(),
            order: None,
            value: template("<x/>"),
        };
        let (doc, marks, reports) = run("<Root><A>hello</A></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), "<Root><A>hello</A></Root>");
        assert_eq!(reports[0].matched, 1);
        assert_eq!(reports[0].changed, 0);
        assert_eq!(reports[0].diagnostics[0].kind, DiagnosticKind::NotAnElement);
        assert!(marks.is_empty());
    }

    #[test]
    fn add_beyond_frontier_marks_nothing_new() {
        let op = Operation::Add {
            xpath: "/Root/A/B".into(),
            order: None,
            value: template("<x/>"),
        };
        let (doc, marks, _) = run("<Root><A><B/></A></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(marked_names(&doc, &marks), ["Root", "A"]);
    }

    #[test]
    fn insert_before_by_default_after_on_append() {
        let before = Operation::Insert {
            xpath: "/Root/B".into(),
            order: None,
            value: template("<x/><y/>"),
        };
        let after = Operation::Insert {
            xpath: "/Root/B".into(),
            order: Some(Order::Append),
            value: template("<p/><q/>"),
        };
        let (doc, _, _) = run("<Root><A/><B/><C/></Root>", DepthBound::Unbounded, &[before, after]);
        assert_eq!(xml(&doc), "<Root><A/><x/><y/><B/><p/><q/><C/></Root>");
    }

    #[test]
    fn replace_keeps_sibling_position() {
        let op = Operation::Replace {
            xpath: "/Root/B".into(),
            value: template("<Z k=\"v\"/><ignored/>"),
        };
        let (doc, marks, reports) = run("<Root><A/><B/><C/></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), "<Root><A/><Z k=\"v\"/><C/></Root>");
        assert_eq!(reports[0].changed, 1);
        assert_eq!(marked_names(&doc, &marks), ["Root", "Z"]);
    }

    #[test]
    fn remove_marks_former_parent_chain() {
        let op = Operation::Remove {
            xpath: "/Root/A/x".into(),
        };
        let (doc, marks, _) = run("<Root><A><x/><y/></A><B/></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), "<Root><A><y/></A><B/></Root>");
        assert_eq!(marked_names(&doc, &marks), ["Root", "A"]);
    }

    #[test]
    fn attribute_add_never_overwrites() {
        let op = Operation::AttributeAdd {
            xpath: "/Root/A".into(),
            attribute: "x".into(),
            value: "2".into(),
        };
        let (doc, marks, reports) = run(r#"<Root><A x="1"/></Root>"#, DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), r#"<Root><A x="1"/></Root>"#);
        assert_eq!(reports[0].changed, 0);
        assert!(marks.is_empty());
    }

    #[test]
    fn attribute_set_is_last_write_wins() {
        let set = |value: &str| Operation::AttributeSet {
            xpath: "/Root/A".into(),
            attribute: "x".into(),
            value: value.into(),
        };
        let (doc, _, _) = run("<Root><A/></Root>", DepthBound::Limited(0), &[set("1"), set("2")]);
        assert_eq!(xml(&doc), r#"<Root><A x="2"/></Root>"#);
    }

    #[test]
    fn attribute_remove_marks_even_when_absent() {
        let op = Operation::AttributeRemove {
            xpath: "/Root/A".into(),
            attribute: "missing".into(),
        };
        let (doc, marks, reports) = run("<Root><A/><B/></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(reports[0].changed, 0);
        assert_eq!(marked_names(&doc, &marks), ["Root", "A"]);
    }

    #[test]
    fn empty_match_is_a_diagnostic() {
        let op = Operation::Remove {
            xpath: "/Root/Missing".into(),
        };
        let (doc, _, reports) = run("<Root><A/></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), "<Root><A/></Root>");
        assert_eq!(reports[0].diagnostics[0].kind, DiagnosticKind::NoMatch);
    }

    #[test]
    fn unsupported_class_suggests_known_name() {
        let op = Operation::Unsupported {
            class: "PatchOperationAttributeSet".into(),
            xpath: "/Root".into(),
        };
        let (_, _, reports) = run("<Root/>", DepthBound::Limited(0), &[op]);
        assert_eq!(
            reports[0].diagnostics[0].kind,
            DiagnosticKind::UnsupportedClass {
                suggestion: Some("AttributeSet")
            }
        );
    }

    #[test]
    fn structural_edits_on_root_are_rejected() {
        let op = Operation::Remove { xpath: "/Root".into() };
        let (doc, _, reports) = run("<Root><A/></Root>", DepthBound::Limited(0), &[op]);
        assert_eq!(xml(&doc), "<Root><A/></Root>");
        assert_eq!(reports[0].diagnostics[0].kind, DiagnosticKind::RootNotEditable);
    }

    #[test]
    fn nested_matches_removed_with_ancestor_are_skipped() {
        let op = Operation::Remove { xpath: "//li".into() };
        let (doc, _, reports) = run("<Root><li><li/></li><B/></Root>", DepthBound::Unbounded, &[op]);
        assert_eq!(xml(&doc), "<Root><B/></Root>");
        assert_eq!(reports[0].matched, 2);
        assert_eq!(reports[0].changed, 1);
    }

    #[test]
    fn malformed_query_is_an_error() {
        let mut document = parse("<Root/>").unwrap();
        let mut marks = PreservationMarks::new();
        let applier = PatchApplier::new(&PathResolver, DepthBound::Limited(0));
        let op = Operation::Remove { xpath: "/Root[".into() };
        assert!(matches!(
            applier.apply(&mut document, &mut marks, &op),
            Err(ApplyError::Query { .. })
        ));
    }
}
