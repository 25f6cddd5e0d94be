//! Scope termini of try edges
//!
//! Each edge leaving a try region runs until it meets the paths of the other
//! edges. The meeting point is the closest common post-dominator of the edge
//! targets; edges sharing a meeting point form a scope group.

use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;

use super::edges::TryEdge;
use crate::cfg::paths::{common_post_dominator, is_path_exists};
use crate::ir::MethodNode;

#[derive(Debug, Clone, Default)]
pub struct TryEdgeScopeGroups {
    termini: BTreeMap<TryEdge, NodeIndex>,
    /// `(kept, removed)` fallthrough pairs that lead into each other
    merged: Vec<(TryEdge, TryEdge)>,
}

impl TryEdgeScopeGroups {
    pub fn build(mth: &MethodNode, edges: &[TryEdge]) -> Self {
        let mut groups = TryEdgeScopeGroups::default();
        groups.merge_same_scopes(mth, edges);

        for edge in edges {
            if groups.is_merged_away(edge) {
                continue;
            }
            if let Some(terminus) = groups.edge_terminus(mth, edges, edge) {
                groups.termini.insert(*edge, terminus);
            }
        }

        // Merged-away edges end where their kept partner ends
        for (kept, removed) in groups.merged.clone() {
            if let Some(terminus) = groups.termini.get(&kept).copied() {
                groups.termini.insert(removed, terminus);
            }
        }
        groups
    }

    /// Fallthrough edges where one target reaches the other share a scope; the
    /// lower edge is kept.
    fn merge_same_scopes(&mut self, mth: &MethodNode, edges: &[TryEdge]) {
        if edges.iter().any(|e| e.target == mth.exit()) {
            return;
        }
        for (i, a) in edges.iter().enumerate() {
            for b in &edges[i + 1..] {
                if !a.is_fallthrough() || !b.is_fallthrough() {
                    continue;
                }
                if self.is_merged_away(a) || self.is_merged_away(b) {
                    continue;
                }
                if is_path_exists(mth, a.target, b.target) {
                    self.merged.push((*b, *a));
                } else if is_path_exists(mth, b.target, a.target) {
                    self.merged.push((*a, *b));
                }
            }
        }
    }

    /// The first common post-dominator shared with any other edge
    fn edge_terminus(&self, mth: &MethodNode, edges: &[TryEdge], edge: &TryEdge) -> Option<NodeIndex> {
        let exit = mth.exit();
        if edge.target == exit {
            return Some(exit);
        }
        let mut scope_ends = Vec::new();
        for other in edges {
            if other == edge || self.is_merged_away(other) {
                continue;
            }
            if other.target == exit {
                scope_ends.push(exit);
                continue;
            }
            if other.target == edge.target {
                continue;
            }
            if let Some(end) = common_post_dominator(mth, edge.target, other.target) {
                scope_ends.push(end);
            }
        }
        if scope_ends.is_empty() {
            return common_post_dominator(mth, edge.target, exit);
        }

        // Every scope end sits on the post-dominator chain of the edge target
        let post = mth.post_dominators().ok()?;
        let found = post
            .dominators(edge.target)?
            .find(|block| scope_ends.contains(block));
        found
    }

    pub fn is_merged_away(&self, edge: &TryEdge) -> bool {
        self.merged.iter().any(|(_, removed)| removed == edge)
    }

    pub fn merged_scopes(&self) -> &[(TryEdge, TryEdge)] {
        &self.merged
    }

    pub fn terminus(&self, edge: &TryEdge) -> Option<NodeIndex> {
        self.termini.get(edge).copied()
    }

    /// Edges grouped by the terminus they run into
    pub fn scope_ends(&self) -> BTreeMap<NodeIndex, Vec<TryEdge>> {
        let mut groups: BTreeMap<NodeIndex, Vec<TryEdge>> = BTreeMap::new();
        for (edge, terminus) in &self.termini {
            if self.is_merged_away(edge) {
                continue;
            }
            groups.entry(*terminus).or_default().push(*edge);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BlockAnalysisPass;
    use crate::decompiler::{DecompileOptions, Pass};
    use crate::ir::MethodBuilder;
    use crate::trycatch::edges::compute_try_edges;
    use crate::trycatch::TryId;

    #[test]
    fn test_catch_and_fallthrough_meet_after_try() {
        let mut b = MethodBuilder::new("scopes");
        let body = b.block();
        let normal = b.block();
        let after = b.block();
        let catch = b.block();
        let finally = b.block();
        b.invoke(body, "a()V", vec![]);
        b.invoke(normal, "f()V", vec![]);
        b.ret(after);
        let e = b.move_exception(catch, 0);
        b.invoke(catch, "log(Ljava/lang/Object;)V", vec![crate::ir::RawArg::Var(e)]);
        b.invoke(catch, "f()V", vec![]);
        let t = b.move_exception(finally, 1);
        b.invoke(finally, "f()V", vec![]);
        b.throw(finally, t);
        b.edge(body, normal).edge(normal, after).edge(catch, after);
        let try_id = b.try_block(
            &[body],
            &[(catch, &["Ljava/lang/Exception;"][..]), (finally, &[][..])],
        );
        let mut mth = b.load().unwrap();
        BlockAnalysisPass.run(&mut mth, &DecompileOptions::default()).unwrap();

        let edges = compute_try_edges(&mth, TryId(try_id));
        let groups = TryEdgeScopeGroups::build(&mth, &edges);
        let ends = groups.scope_ends();

        assert_eq!(ends.len(), 2);
        assert_eq!(ends[&NodeIndex::new(after)].len(), 2);
        assert_eq!(ends[&mth.exit()].len(), 1);
        assert!(groups.merged_scopes().is_empty());
    }
}
