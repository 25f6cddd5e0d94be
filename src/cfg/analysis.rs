//! CFG analysis module
//!
//! Dominators, post-dominators, loop back edges and exception handler regions.
//! Everything later passes rely on is computed here once per method.

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeFiltered, EdgeRef, Reversed};
use std::collections::HashSet;

use super::paths::dominated_blocks;
use super::{Block, EdgeKind};
use crate::decompiler::{DecompileOptions, Pass};
use crate::error::Result;
use crate::ir::MethodNode;

/// Dominators from the entry block, following exception edges too
pub fn analyze_dominators(
    graph: &DiGraph<Block, EdgeKind>,
    entry: NodeIndex,
) -> Dominators<NodeIndex> {
    dominators::simple_fast(graph, entry)
}

/// Post-dominators rooted at the synthetic exit, over normal edges only
pub fn analyze_post_dominators(
    graph: &DiGraph<Block, EdgeKind>,
    exit: NodeIndex,
) -> Dominators<NodeIndex> {
    let normal = EdgeFiltered::from_fn(graph, |e| !e.weight().is_exception());
    dominators::simple_fast(Reversed(&normal), exit)
}

/// Back edges: edges whose target dominates their source
pub fn find_back_edges(
    graph: &DiGraph<Block, EdgeKind>,
    dominators: &Dominators<NodeIndex>,
) -> HashSet<(NodeIndex, NodeIndex)> {
    let mut back_edges = HashSet::new();
    for edge in graph.edge_references() {
        if edge.weight().is_exception() {
            continue;
        }
        let (source, target) = (edge.source(), edge.target());
        let dominated = dominators
            .dominators(source)
            .map_or(false, |mut chain| chain.any(|d| d == target));
        if dominated {
            back_edges.insert((source, target));
        }
    }
    back_edges
}

/// Computes the analysis results the finally extraction depends on
pub struct BlockAnalysisPass;

impl Pass for BlockAnalysisPass {
    fn name(&self) -> &'static str {
        "block-analysis"
    }

    fn run(&self, mth: &mut MethodNode, _options: &DecompileOptions) -> Result<()> {
        let doms = analyze_dominators(mth.graph(), mth.entry());
        let post_doms = analyze_post_dominators(mth.graph(), mth.exit());
        let back_edges = find_back_edges(mth.graph(), &doms);

        let loop_ends: HashSet<NodeIndex> = back_edges.iter().map(|(source, _)| *source).collect();
        for block in mth.graph().node_indices().collect::<Vec<_>>() {
            mth.block_mut(block).flags.loop_end = loop_ends.contains(&block);
        }
        log::debug!(
            "{}: {} back edges, {} loop ends",
            mth.name(),
            back_edges.len(),
            loop_ends.len()
        );

        let handler_blocks: Vec<Vec<NodeIndex>> = mth
            .handlers()
            .iter()
            .map(|handler| dominated_blocks(mth, &doms, handler.entry))
            .collect();
        for (idx, blocks) in handler_blocks.into_iter().enumerate() {
            mth.handler_mut(crate::trycatch::HandlerId(idx)).blocks = blocks;
        }

        mth.set_back_edges(back_edges);
        mth.set_dominators(doms);
        mth.set_post_dominators(post_doms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MethodBuilder;

    #[test]
    fn test_loop_end_marked() {
        let mut b = MethodBuilder::new("loop");
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let tail = b.block();
        let cond = b.var(0);
        b.goto(entry);
        b.if_test(header, cond);
        b.invoke(body, "step()V", vec![]);
        b.ret(tail);
        b.edge(entry, header).edge(header, body).edge(header, tail).edge(body, header);
        let mut mth = b.load().unwrap();
        BlockAnalysisPass
            .run(&mut mth, &DecompileOptions::default())
            .unwrap();

        assert!(mth.is_back_edge(NodeIndex::new(body), NodeIndex::new(header)));
        assert!(mth.block(NodeIndex::new(body)).flags.loop_end);
        assert!(!mth.block(NodeIndex::new(header)).flags.loop_end);
    }

    #[test]
    fn test_handler_blocks_are_dominated_region() {
        let mut b = MethodBuilder::new("handler");
        let body = b.block();
        let after = b.block();
        let handler = b.block();
        let handler_tail = b.block();
        b.invoke(body, "a()V", vec![]);
        b.ret(after);
        let exc = b.move_exception(handler, 0);
        b.invoke(handler_tail, "f()V", vec![]);
        b.throw(handler_tail, exc);
        b.edge(body, after).edge(handler, handler_tail);
        b.try_block(&[body], &[(handler, &[][..])]);
        let mut mth = b.load().unwrap();
        BlockAnalysisPass
            .run(&mut mth, &DecompileOptions::default())
            .unwrap();

        let blocks = &mth.handlers()[0].blocks;
        assert_eq!(blocks, &vec![NodeIndex::new(handler), NodeIndex::new(handler_tail)]);
    }
}
