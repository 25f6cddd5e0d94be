//! Try/catch bookkeeping
//!
//! Try blocks and exception handlers are owned by the method and addressed by id.
//! This module also computes the edges leaving a try region, the scope each edge
//! reaches before paths reconverge, and the per-edge block map used to bound
//! duplicate search.

pub mod edge_map;
pub mod edges;
pub mod scope;

pub use edge_map::TryCatchEdgeBlockMap;
pub use edges::{TryEdge, TryEdgeKind};
pub use scope::TryEdgeScopeGroups;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::fmt;

use crate::ir::MethodNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TryId(pub usize);

impl fmt::Display for TryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandlerId(pub usize);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub id: HandlerId,
    /// Block the exception edge lands on
    pub entry: NodeIndex,
    /// Empty for a catch-all handler
    pub catch_types: Vec<String>,
    pub try_block: TryId,
    /// Entry plus every block it dominates, filled by block analysis
    pub blocks: Vec<NodeIndex>,
    pub is_finally: bool,
    pub removed: bool,
}

impl ExceptionHandler {
    pub fn is_catch_all(&self) -> bool {
        self.catch_types.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TryCatchBlock {
    pub id: TryId,
    pub blocks: Vec<NodeIndex>,
    pub handlers: Vec<HandlerId>,
    pub inner: Vec<TryId>,
    pub outer: Option<TryId>,
    /// Folded into its outer try block
    pub merged: bool,
    /// Every handler was removed
    pub implicit: bool,
}

impl TryCatchBlock {
    pub fn is_implicit_or_merged(&self) -> bool {
        self.implicit || self.merged
    }

    pub fn contains_block(&self, block: NodeIndex) -> bool {
        self.blocks.contains(&block)
    }
}

/// Live handlers of a try block
pub fn own_handlers(mth: &MethodNode, try_id: TryId) -> Vec<HandlerId> {
    mth.try_block(try_id)
        .handlers
        .iter()
        .copied()
        .filter(|h| !mth.handler(*h).removed)
        .collect()
}

/// Own handlers plus the handlers of direct inner try blocks, one level deep
pub fn merged_handlers(mth: &MethodNode, try_id: TryId) -> Vec<HandlerId> {
    let mut handlers = own_handlers(mth, try_id);
    for inner in active_inner_tries(mth, try_id) {
        for handler in own_handlers(mth, inner) {
            if !handlers.contains(&handler) {
                handlers.push(handler);
            }
        }
    }
    handlers
}

/// Direct inner try blocks that have not been folded away
pub fn active_inner_tries(mth: &MethodNode, try_id: TryId) -> Vec<TryId> {
    mth.try_block(try_id)
        .inner
        .iter()
        .copied()
        .filter(|inner| !mth.try_block(*inner).is_implicit_or_merged())
        .collect()
}

/// True when some inner try block has live inner try blocks of its own
pub fn has_deep_nesting(mth: &MethodNode, try_id: TryId) -> bool {
    active_inner_tries(mth, try_id)
        .into_iter()
        .any(|inner| !active_inner_tries(mth, inner).is_empty())
}

pub fn catch_all_handler(mth: &MethodNode, try_id: TryId) -> Option<HandlerId> {
    own_handlers(mth, try_id)
        .into_iter()
        .find(|h| mth.handler(*h).is_catch_all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MethodBuilder;

    #[test]
    fn test_merged_handlers_include_one_inner_level() {
        let mut b = MethodBuilder::new("nested");
        let entry = b.block();
        let inner_body = b.block();
        let inner_catch = b.block();
        let outer_catch = b.block();
        b.ret(entry);
        b.ret(inner_body);
        b.ret(inner_catch);
        b.ret(outer_catch);
        b.edge(entry, inner_body);
        let outer = b.try_block(&[entry, inner_body], &[(outer_catch, &[][..])]);
        let inner = b.try_block(&[inner_body], &[(inner_catch, &["Ljava/io/IOException;"][..])]);
        b.nest(inner, outer);
        let mth = b.load().unwrap();

        let outer_handlers = merged_handlers(&mth, TryId(outer));
        assert_eq!(outer_handlers.len(), 2);
        assert_eq!(own_handlers(&mth, TryId(outer)).len(), 1);
        assert!(catch_all_handler(&mth, TryId(outer)).is_some());
        assert!(catch_all_handler(&mth, TryId(inner)).is_none());
        assert!(!has_deep_nesting(&mth, TryId(outer)));
    }
}
