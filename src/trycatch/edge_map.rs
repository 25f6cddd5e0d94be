//! Blocks in scope for every try edge

use petgraph::graph::NodeIndex;

use super::edges::{compute_try_edges, try_region, TryEdge};
use super::scope::TryEdgeScopeGroups;
use super::{HandlerId, TryId};
use crate::cfg::paths::collect_successors_until;
use crate::ir::MethodNode;

#[derive(Debug, Clone)]
pub struct EdgeScope {
    pub edge: TryEdge,
    /// First block shared with the other edges; never part of `blocks`
    pub terminus: NodeIndex,
    pub blocks: Vec<NodeIndex>,
}

impl EdgeScope {
    pub fn contains(&self, block: NodeIndex) -> bool {
        self.blocks.contains(&block)
    }
}

/// Per-edge block lists of one try block. Finally handler blocks never appear in
/// another edge's list.
#[derive(Debug, Clone)]
pub struct TryCatchEdgeBlockMap {
    finally_handler: HandlerId,
    scopes: Vec<EdgeScope>,
}

impl TryCatchEdgeBlockMap {
    pub fn build(
        mth: &MethodNode,
        try_id: TryId,
        finally_handler: HandlerId,
        finally_blocks: &[NodeIndex],
    ) -> Self {
        let edges = compute_try_edges(mth, try_id);
        let groups = TryEdgeScopeGroups::build(mth, &edges);
        let region = try_region(mth, try_id);

        let mut scopes = Vec::new();
        for (terminus, group) in groups.scope_ends() {
            for edge in group {
                let blocks = if edge.handler() == Some(finally_handler) {
                    finally_blocks.to_vec()
                } else {
                    let mut blocks = Vec::new();
                    if edge.is_fallthrough() {
                        blocks.extend(region.iter().copied());
                    }
                    for block in collect_successors_until(mth, edge.target, terminus, true) {
                        if !blocks.contains(&block) {
                            blocks.push(block);
                        }
                    }
                    blocks.retain(|b| !finally_blocks.contains(b));
                    blocks
                };
                scopes.push(EdgeScope {
                    edge,
                    terminus,
                    blocks,
                });
            }
        }

        log::trace!(
            "{}: edge map for {} has {} scopes",
            mth.name(),
            try_id,
            scopes.len()
        );
        TryCatchEdgeBlockMap {
            finally_handler,
            scopes,
        }
    }

    pub fn finally_scope(&self) -> Option<&EdgeScope> {
        self.scopes
            .iter()
            .find(|s| s.edge.handler() == Some(self.finally_handler))
    }

    /// Every scope other than the finally handler's
    pub fn candidate_scopes(&self) -> impl Iterator<Item = &EdgeScope> {
        self.scopes
            .iter()
            .filter(move |s| s.edge.handler() != Some(self.finally_handler))
    }

    pub fn scopes(&self) -> &[EdgeScope] {
        &self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BlockAnalysisPass;
    use crate::decompiler::{DecompileOptions, Pass};
    use crate::ir::MethodBuilder;

    #[test]
    fn test_finally_blocks_excluded_from_other_edges() {
        let mut b = MethodBuilder::new("edge_map");
        let body = b.block();
        let normal = b.block();
        let handler = b.block();
        b.invoke(body, "a()V", vec![]);
        b.invoke(normal, "f()V", vec![]);
        b.ret(normal);
        let t = b.move_exception(handler, 0);
        b.invoke(handler, "f()V", vec![]);
        b.throw(handler, t);
        b.edge(body, normal);
        let try_id = b.try_block(&[body], &[(handler, &[][..])]);
        let mut mth = b.load().unwrap();
        BlockAnalysisPass.run(&mut mth, &DecompileOptions::default()).unwrap();

        let finally_blocks = vec![NodeIndex::new(handler)];
        let map = TryCatchEdgeBlockMap::build(&mth, TryId(try_id), HandlerId(0), &finally_blocks);

        let finally = map.finally_scope().unwrap();
        assert_eq!(finally.blocks, finally_blocks);
        assert_eq!(finally.terminus, mth.exit());

        let candidates: Vec<&EdgeScope> = map.candidate_scopes().collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].blocks,
            vec![NodeIndex::new(body), NodeIndex::new(normal)]
        );
    }
}
