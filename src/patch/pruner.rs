//! Depth-bounded pruning of untouched nodes.
//!
//! Levels are walked outward from the root. At each level inside the bound an
//! unmarked node is detached together with its subtree, so its descendants are
//! never visited. Below the frontier nothing is inspected: a surviving
//! frontier node keeps its whole subtree verbatim.

use crate::patch::preserve::{DepthBound, PreservationMarks};
use crate::tree::{Document, NodeId, NodeKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Subtrees detached by the pruner.
    pub removed: usize,
    /// Comment nodes stripped afterwards.
    pub comments_removed: usize,
}

/// Prune `document` down to `bound`, consuming the marks.
pub fn prune(document: &mut Document, marks: PreservationMarks, bound: DepthBound) -> PruneReport {
    let mut report = PruneReport::default();
    let Some(frontier) = bound.frontier() else {
        return report;
    };

    let mut level: Vec<NodeId> = document.children(document.root()).to_vec();
    for _depth in 1..=frontier {
        let mut next = Vec::new();
        for id in level {
            if marks.is_marked(id) {
                next.extend_from_slice(document.children(id));
            } else if document.detach(id).is_ok() {
                report.removed += 1;
            }
        }
        level = next;
    }

    report
}

/// Remove every comment node in the attached tree. Returns how many were removed.
pub fn strip_comments(document: &mut Document) -> usize {
    let comments: Vec<NodeId> = document
        .nodes()
        .filter(|id| matches!(document.kind(*id), NodeKind::Comment(_)))
        .collect();
    comments
        .into_iter()
        .filter(|id| document.detach(*id).is_ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PathResolver, QueryResolver};
    use crate::tree::{parse, to_string, WriteOptions};

    const BASE: &str = "<Root><A><A1><A11/></A1></A><B><B1><B11/></B1><B2/></B><!--c--></Root>";

    fn xml(document: &Document) -> String {
        to_string(document, &WriteOptions::compact()).unwrap()
    }

    fn mark_path(document: &Document, marks: &mut PreservationMarks, query: &str) {
        for id in PathResolver.resolve(document, query).unwrap() {
            marks.mark(id);
        }
    }

    #[test]
    fn nothing_marked_leaves_only_root() {
        for max in 0..3 {
            let mut doc = parse(BASE).unwrap();
            let report = prune(&mut doc, PreservationMarks::new(), DepthBound::Limited(max));
            assert_eq!(xml(&doc), "<Root/>");
            assert_eq!(report.removed, 3);
        }
    }

    #[test]
    fn unbounded_keeps_everything() {
        let mut doc = parse(BASE).unwrap();
        let report = prune(&mut doc, PreservationMarks::new(), DepthBound::Unbounded);
        assert_eq!(xml(&doc), BASE);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn frontier_node_keeps_subtree_verbatim() {
        let mut doc = parse(BASE).unwrap();
        let mut marks = PreservationMarks::new();
        mark_path(&doc, &mut marks, "/Root/B");
        prune(&mut doc, marks, DepthBound::Limited(0));
        assert_eq!(xml(&doc), "<Root><B><B1><B11/></B1><B2/></B></Root>");
    }

    #[test]
    fn levels_inside_bound_are_pruned() {
        let mut doc = parse(BASE).unwrap();
        let mut marks = PreservationMarks::new();
        mark_path(&doc, &mut marks, "/Root/B | /Root/B/B1");
        prune(&mut doc, marks, DepthBound::Limited(1));
        assert_eq!(xml(&doc), "<Root><B><B1><B11/></B1></B></Root>");
    }

    #[test]
    fn marked_child_of_pruned_parent_goes_with_it() {
        let mut doc = parse(BASE).unwrap();
        let mut marks = PreservationMarks::new();
        mark_path(&doc, &mut marks, "/Root/A/A1");
        prune(&mut doc, marks, DepthBound::Limited(1));
        assert_eq!(xml(&doc), "<Root/>");
    }

    #[test]
    fn strip_comments_removes_all_comments() {
        let mut doc = parse("<Root><!--a--><A><!--b--><B/></A></Root>").unwrap();
        assert_eq!(strip_comments(&mut doc), 2);
        assert_eq!(xml(&doc), "<Root><A><B/></A></Root>");
    }
}
