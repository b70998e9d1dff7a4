use crate::query::cache;
use crate::query::errors::QueryError;
use crate::query::path::{Axis, LocationPath, NodeTest, PathExpr, Predicate, Step};
use crate::tree::{Document, NodeId, NodeKind};
use std::collections::HashMap;

/// Resolves a query string against a document.
///
/// Implementations must return matches in document order without duplicates,
/// and must not mutate anything. A malformed query is an error; a query that
/// matches nothing is an empty `Vec`.
pub trait QueryResolver {
    fn resolve(&self, document: &Document, query: &str) -> Result<Vec<NodeId>, QueryError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }
}

impl QueryResolver for PathResolver {
    fn resolve(&self, document: &Document, query: &str) -> Result<Vec<NodeId>, QueryError> {
        let expr = cache::get_or_compile(query)?;
        Ok(evaluate(&expr, document))
    }
}

/// A position in the node set: the virtual document node above the root
/// element, or a real node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Context {
    Document,
    Node(NodeId),
}

pub fn evaluate(expr: &PathExpr, document: &Document) -> Vec<NodeId> {
    let order = DocumentOrder::new(document);
    let mut matches: Vec<NodeId> = expr
        .alternatives
        .iter()
        .flat_map(|path| evaluate_path(path, document, &order))
        .filter_map(|context| match context {
            Context::Node(id) => Some(id),
            Context::Document => None,
        })
        .collect();
    order.sort(&mut matches);
    matches.dedup();
    matches
}

fn evaluate_path(path: &LocationPath, document: &Document, order: &DocumentOrder) -> Vec<Context> {
    let mut current = vec![Context::Document];
    for step in &path.steps {
        let mut next = Vec::new();
        for context in &current {
            next.extend(evaluate_step(step, *context, document));
        }
        order.sort_contexts(&mut next);
        next.dedup();
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn evaluate_step(step: &Step, context: Context, document: &Document) -> Vec<Context> {
    let mut candidates: Vec<Context> = axis_nodes(step.axis, context, document)
        .into_iter()
        .filter(|candidate| node_test(&step.test, *candidate, document))
        .collect();

    for predicate in &step.predicates {
        let size = candidates.len();
        candidates = candidates
            .into_iter()
            .enumerate()
            .filter(|(index, candidate)| match candidate {
                Context::Node(id) => predicate_matches(predicate, *id, index + 1, size, document),
                Context::Document => false,
            })
            .map(|(_, candidate)| candidate)
            .collect();
    }

    candidates
}

fn axis_nodes(axis: Axis, context: Context, document: &Document) -> Vec<Context> {
    match (axis, context) {
        (Axis::Child, Context::Document) => vec![Context::Node(document.root())],
        (Axis::Child, Context::Node(id)) => document
            .children(id)
            .iter()
            .map(|child| Context::Node(*child))
            .collect(),
        (Axis::DescendantOrSelf, Context::Document) => std::iter::once(Context::Document)
            .chain(document.nodes().map(Context::Node))
            .collect(),
        (Axis::DescendantOrSelf, Context::Node(id)) => {
            document.descendants(id).map(Context::Node).collect()
        }
        (Axis::SelfNode, context) => vec![context],
        (Axis::Parent, Context::Document) => Vec::new(),
        (Axis::Parent, Context::Node(id)) => match document.parent(id) {
            Some(parent) => vec![Context::Node(parent)],
            None if id == document.root() => vec![Context::Document],
            None => Vec::new(),
        },
    }
}

fn node_test(test: &NodeTest, context: Context, document: &Document) -> bool {
    let id = match context {
        Context::Document => return matches!(test, NodeTest::AnyNode),
        Context::Node(id) => id,
    };
    match (test, document.kind(id)) {
        (NodeTest::AnyNode, _) => true,
        (NodeTest::AnyElement, NodeKind::Element(_)) => true,
        (NodeTest::Name(name), NodeKind::Element(element)) => element.name == *name,
        (NodeTest::Text, NodeKind::Text(_)) => true,
        (NodeTest::Comment, NodeKind::Comment(_)) => true,
        _ => false,
    }
}

fn predicate_matches(
    predicate: &Predicate,
    id: NodeId,
    position: usize,
    size: usize,
    document: &Document,
) -> bool {
    match predicate {
        Predicate::Position(expected) => position == *expected,
        Predicate::Last => position == size,
        Predicate::Attribute { name, comparison } => {
            match document.element(id).and_then(|element| element.attribute(name)) {
                Some(value) => comparison.as_ref().map_or(true, |c| c.matches(value)),
                None => false,
            }
        }
        Predicate::Child { name, comparison } => document.child_elements(id).any(|child| {
            document.name(child) == Some(name.as_str())
                && comparison
                    .as_ref()
                    .map_or(true, |c| c.matches(&document.text_content(child)))
        }),
        Predicate::Text(comparison) => document.children(id).iter().any(|child| {
            matches!(document.kind(*child), NodeKind::Text(text) if comparison.matches(text))
        }),
        Predicate::Not(inner) => !predicate_matches(inner, id, position, size, document),
        Predicate::And(left, right) => {
            predicate_matches(left, id, position, size, document)
                && predicate_matches(right, id, position, size, document)
        }
        Predicate::Or(left, right) => {
            predicate_matches(left, id, position, size, document)
                || predicate_matches(right, id, position, size, document)
        }
    }
}

/// Pre-order rank of every attached node.
struct DocumentOrder {
    rank: HashMap<NodeId, usize>,
}

impl DocumentOrder {
    fn new(document: &Document) -> Self {
        Self {
            rank: document
                .nodes()
                .enumerate()
                .map(|(index, id)| (id, index))
                .collect(),
        }
    }

    fn rank(&self, id: NodeId) -> usize {
        self.rank.get(&id).copied().unwrap_or(usize::MAX)
    }

    fn sort(&self, ids: &mut [NodeId]) {
        ids.sort_by_key(|id| self.rank(*id));
    }

    fn sort_contexts(&self, contexts: &mut [Context]) {
        contexts.sort_by_key(|context| match context {
            Context::Document => 0,
            Context::Node(id) => self.rank(*id).saturating_add(1),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse;

    const DEFS: &str = r#"
<Defs>
  <ThingDef Name="BaseThing" Abstract="True">
    <label>base</label>
  </ThingDef>
  <ThingDef ParentName="BaseThing">
    <defName>Human</defName>
    <comps>
      <li>one</li>
      <li>two</li>
    </comps>
  </ThingDef>
  <ThingDef ParentName="BaseThing">
    <defName>Dog</defName>
    <comps>
      <li>three</li>
    </comps>
  </ThingDef>
  <!-- trailing -->
</Defs>"#;

    fn texts(document: &Document, query: &str) -> Vec<String> {
        PathResolver
            .resolve(document, query)
            .unwrap()
            .into_iter()
            .map(|id| document.text_content(id))
            .collect()
    }

    #[test]
    fn resolves_absolute_path() {
        let doc = parse(DEFS).unwrap();
        let matches = PathResolver.resolve(&doc, "/Defs/ThingDef").unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn relative_path_starts_at_document() {
        let doc = parse(DEFS).unwrap();
        assert_eq!(PathResolver.resolve(&doc, "Defs/ThingDef").unwrap().len(), 3);
    }

    #[test]
    fn resolves_child_value_predicate() {
        let doc = parse(DEFS).unwrap();
        assert_eq!(
            texts(&doc, r#"/Defs/ThingDef[defName="Human"]/comps/li"#),
            ["one", "two"]
        );
    }

    #[test]
    fn descendant_results_are_in_document_order() {
        let doc = parse(DEFS).unwrap();
        assert_eq!(texts(&doc, "//li"), ["one", "two", "three"]);
        assert_eq!(texts(&doc, "//comps/li | /Defs/ThingDef/label"), ["base", "one", "two", "three"]);
    }

    #[test]
    fn positional_predicates_apply_per_parent() {
        let doc = parse(DEFS).unwrap();
        assert_eq!(texts(&doc, "//li[1]"), ["one", "three"]);
        assert_eq!(texts(&doc, "//li[last()]"), ["two", "three"]);
    }

    #[test]
    fn attribute_predicates() {
        let doc = parse(DEFS).unwrap();
        assert_eq!(PathResolver.resolve(&doc, "/Defs/ThingDef[@Abstract]").unwrap().len(), 1);
        assert_eq!(
            PathResolver
                .resolve(&doc, "/Defs/ThingDef[@ParentName='BaseThing' and not(defName='Dog')]")
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            PathResolver.resolve(&doc, "/Defs/ThingDef[@Name!='x']").unwrap().len(),
            1
        );
    }

    #[test]
    fn parent_and_text_steps() {
        let doc = parse(DEFS).unwrap();
        let parents = PathResolver.resolve(&doc, "//defName[text()='Dog']/..").unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(doc.name(parents[0]), Some("ThingDef"));
        assert_eq!(PathResolver.resolve(&doc, "/Defs/comment()").unwrap().len(), 1);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let doc = parse(DEFS).unwrap();
        assert!(PathResolver.resolve(&doc, "/Defs/Missing").unwrap().is_empty());
        assert!(PathResolver.resolve(&doc, "/Other").unwrap().is_empty());
    }

    #[test]
    fn malformed_query_is_error() {
        let doc = parse(DEFS).unwrap();
        assert!(matches!(
            PathResolver.resolve(&doc, "/Defs/ThingDef[@Name="),
            Err(QueryError::Syntax { .. })
        ));
    }
}
