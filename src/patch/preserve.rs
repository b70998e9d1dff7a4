//! Depth bound and preservation marks shared by the applier and the pruner.

use crate::tree::{Document, NodeId};
use std::collections::HashSet;
use std::fmt;

/// How much of an untouched document survives pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthBound {
    /// Levels `1..=max + 1` are pruned of unmarked nodes.
    Limited(usize),
    /// Nothing is pruned; the whole document is copied.
    Unbounded,
}

impl DepthBound {
    /// Deepest level the pruner inspects.
    pub fn frontier(self) -> Option<usize> {
        match self {
            DepthBound::Limited(max) => Some(max + 1),
            DepthBound::Unbounded => None,
        }
    }

    /// Whether a node at `depth` sits in the pruned region and therefore
    /// needs a mark to survive.
    pub fn covers(self, depth: usize) -> bool {
        match self.frontier() {
            Some(frontier) => depth <= frontier,
            None => true,
        }
    }
}

impl fmt::Display for DepthBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthBound::Limited(max) => write!(f, "{max}"),
            DepthBound::Unbounded => write!(f, "full"),
        }
    }
}

/// Out-of-band record of nodes that must survive pruning.
///
/// Marks are only ever added while a file is processed; the pruner consumes
/// the set, so nothing of it reaches the serialized output.
#[derive(Debug, Clone, Default)]
pub struct PreservationMarks {
    marked: HashSet<NodeId>,
}

impl PreservationMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: NodeId) {
        self.marked.insert(id);
    }

    pub fn is_marked(&self, id: NodeId) -> bool {
        self.marked.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    /// Marks `id` if its current depth is inside the bound.
    pub fn mark_within(&mut self, document: &Document, id: NodeId, bound: DepthBound) -> bool {
        if bound.covers(document.depth(id)) {
            self.mark(id);
            true
        } else {
            false
        }
    }

    /// Marks `start` and every ancestor above it that is inside the bound.
    pub fn mark_ancestors(&mut self, document: &Document, start: Option<NodeId>, bound: DepthBound) {
        let mut current = start;
        while let Some(id) = current {
            self.mark_within(document, id, bound);
            current = document.parent(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse;
    use crate::query::{PathResolver, QueryResolver};

    #[test]
    fn limited_bound_covers_up_to_frontier() {
        let bound = DepthBound::Limited(1);
        assert_eq!(bound.frontier(), Some(2));
        assert!(bound.covers(0));
        assert!(bound.covers(2));
        assert!(!bound.covers(3));
        assert!(DepthBound::Unbounded.covers(100));
    }

    #[test]
    fn ancestors_beyond_frontier_are_not_marked() {
        let doc = parse("<Root><A><B><C><D/></C></B></A></Root>").unwrap();
        let d = PathResolver.resolve(&doc, "//D").unwrap()[0];
        let mut marks = PreservationMarks::new();
        marks.mark_ancestors(&doc, doc.parent(d), DepthBound::Limited(0));

        let names: Vec<&str> = doc
            .nodes()
            .filter(|id| marks.is_marked(*id))
            .filter_map(|id| doc.name(id))
            .collect();
        assert_eq!(names, ["Root", "A"]);
    }
}
