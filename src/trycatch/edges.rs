//! Edges leaving a try region
//!
//! Control leaves a try block either through one of its handlers or by falling
//! out of the protected blocks into ordinary code.

use petgraph::graph::NodeIndex;
use std::fmt;

use super::{active_inner_tries, merged_handlers, HandlerId, TryId};
use crate::cfg::paths::{clean_successors, exception_successors};
use crate::ir::MethodNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TryEdgeKind {
    /// Exception edge into a handler
    Handler(HandlerId),
    /// Normal edge out of the protected blocks
    Fallthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TryEdge {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub kind: TryEdgeKind,
}

impl TryEdge {
    pub fn handler(&self) -> Option<HandlerId> {
        match self.kind {
            TryEdgeKind::Handler(handler) => Some(handler),
            TryEdgeKind::Fallthrough => None,
        }
    }

    pub fn is_handler_exit(&self) -> bool {
        matches!(self.kind, TryEdgeKind::Handler(_))
    }

    pub fn is_fallthrough(&self) -> bool {
        self.kind == TryEdgeKind::Fallthrough
    }
}

impl fmt::Display for TryEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TryEdgeKind::Handler(h) => write!(
                f,
                "{} -> {} ({})",
                self.source.index(),
                self.target.index(),
                h
            ),
            TryEdgeKind::Fallthrough => write!(
                f,
                "{} -> {} (fallthrough)",
                self.source.index(),
                self.target.index()
            ),
        }
    }
}

/// Protected blocks of a try block together with its live inner try blocks
pub fn try_region(mth: &MethodNode, try_id: TryId) -> Vec<NodeIndex> {
    let mut region = mth.try_block(try_id).blocks.clone();
    for inner in active_inner_tries(mth, try_id) {
        for &block in &mth.try_block(inner).blocks {
            if !region.contains(&block) {
                region.push(block);
            }
        }
    }
    region
}

/// Every handler edge and every distinct fallthrough edge of a try block
pub fn compute_try_edges(mth: &MethodNode, try_id: TryId) -> Vec<TryEdge> {
    let region = try_region(mth, try_id);
    let handlers = merged_handlers(mth, try_id);
    let handler_entries: Vec<NodeIndex> = handlers.iter().map(|h| mth.handler(*h).entry).collect();

    let mut edges = Vec::new();
    for &handler in &handlers {
        let entry = mth.handler(handler).entry;
        let source = region
            .iter()
            .copied()
            .find(|&b| exception_successors(mth, b).contains(&entry))
            .or_else(|| region.first().copied());
        if let Some(source) = source {
            edges.push(TryEdge {
                source,
                target: entry,
                kind: TryEdgeKind::Handler(handler),
            });
        }
    }

    let mut seen_targets = Vec::new();
    for &block in &region {
        for succ in clean_successors(mth, block) {
            if region.contains(&succ) || handler_entries.contains(&succ) {
                continue;
            }
            if seen_targets.contains(&succ) {
                continue;
            }
            seen_targets.push(succ);
            edges.push(TryEdge {
                source: block,
                target: succ,
                kind: TryEdgeKind::Fallthrough,
            });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MethodBuilder;

    #[test]
    fn test_edges_of_try_with_catch_all() {
        let mut b = MethodBuilder::new("edges");
        let body = b.block();
        let after = b.block();
        let handler = b.block();
        b.invoke(body, "a()V", vec![]);
        b.ret(after);
        let exc = b.move_exception(handler, 0);
        b.throw(handler, exc);
        b.edge(body, after);
        let try_id = b.try_block(&[body], &[(handler, &[][..])]);
        let mth = b.load().unwrap();

        let edges = compute_try_edges(&mth, TryId(try_id));
        assert_eq!(edges.len(), 2);
        assert!(edges[0].is_handler_exit());
        assert_eq!(edges[0].target, NodeIndex::new(handler));
        assert!(edges[1].is_fallthrough());
        assert_eq!(edges[1].target, NodeIndex::new(after));
    }
}
