//! Path helpers over the method graph
//!
//! Successor lists are returned in edge insertion order so every traversal built
//! on top of them is deterministic.

use petgraph::algo::dominators::Dominators;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};

use super::EdgeKind;
use crate::ir::MethodNode;

fn neighbors_by(
    mth: &MethodNode,
    block: NodeIndex,
    dir: Direction,
    keep: impl Fn(EdgeKind, NodeIndex) -> bool,
) -> Vec<NodeIndex> {
    let mut edges: Vec<_> = mth
        .graph()
        .edges_directed(block, dir)
        .filter_map(|e| {
            let other = match dir {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            };
            keep(*e.weight(), other).then_some((e.id(), other))
        })
        .collect();
    edges.sort_by_key(|(id, _)| *id);
    let mut out = Vec::with_capacity(edges.len());
    for (_, node) in edges {
        if !out.contains(&node) {
            out.push(node);
        }
    }
    out
}

/// Normal successors, back edges included
pub fn successors(mth: &MethodNode, block: NodeIndex) -> Vec<NodeIndex> {
    neighbors_by(mth, block, Direction::Outgoing, |kind, _| !kind.is_exception())
}

/// Successors excluding exception-handler edges and loop back edges
pub fn clean_successors(mth: &MethodNode, block: NodeIndex) -> Vec<NodeIndex> {
    let loop_end = mth.block(block).flags.loop_end;
    neighbors_by(mth, block, Direction::Outgoing, |kind, target| {
        !kind.is_exception() && !(loop_end && mth.is_back_edge(block, target))
    })
}

/// Normal predecessors, back edges included
pub fn predecessors(mth: &MethodNode, block: NodeIndex) -> Vec<NodeIndex> {
    neighbors_by(mth, block, Direction::Incoming, |kind, _| !kind.is_exception())
}

/// Predecessors excluding exception edges and loop back edges
pub fn clean_predecessors(mth: &MethodNode, block: NodeIndex) -> Vec<NodeIndex> {
    neighbors_by(mth, block, Direction::Incoming, |kind, source| {
        !kind.is_exception() && !mth.is_back_edge(source, block)
    })
}

/// Exception-handler entries reachable from a block
pub fn exception_successors(mth: &MethodNode, block: NodeIndex) -> Vec<NodeIndex> {
    neighbors_by(mth, block, Direction::Outgoing, |kind, _| kind.is_exception())
}

pub fn is_path_exists(mth: &MethodNode, from: NodeIndex, to: NodeIndex) -> bool {
    if from == to {
        return true;
    }
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([from]);
    while let Some(block) = queue.pop_front() {
        for succ in successors(mth, block) {
            if succ == to {
                return true;
            }
            if visited.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    false
}

/// Blocks reachable from `start` before hitting `until`, which is excluded.
/// The synthetic exit is never part of the result.
pub fn collect_successors_until(
    mth: &MethodNode,
    start: NodeIndex,
    until: NodeIndex,
    clean: bool,
) -> Vec<NodeIndex> {
    let mut result = Vec::new();
    if start == until || start == mth.exit() {
        return result;
    }
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(block) = queue.pop_front() {
        result.push(block);
        let next = if clean {
            clean_successors(mth, block)
        } else {
            successors(mth, block)
        };
        for succ in next {
            if succ != until && succ != mth.exit() && visited.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    result
}

/// Skip a chain of empty single-successor blocks
pub fn follow_empty_path(mth: &MethodNode, start: NodeIndex) -> NodeIndex {
    let mut current = start;
    let mut visited = HashSet::from([start]);
    loop {
        if !mth.block(current).is_empty() || mth.block(current).is_exit() {
            return current;
        }
        match clean_successors(mth, current).as_slice() {
            [next] if visited.insert(*next) => current = *next,
            _ => return current,
        }
    }
}

/// Block of the set that every other member can reach
pub fn bottom_block(mth: &MethodNode, blocks: &[NodeIndex]) -> Option<NodeIndex> {
    match blocks {
        [] => None,
        [single] => Some(*single),
        _ => blocks
            .iter()
            .copied()
            .find(|&candidate| blocks.iter().all(|&b| is_path_exists(mth, b, candidate))),
    }
}

/// Block of the set that reaches every other member
pub fn top_block(mth: &MethodNode, blocks: &[NodeIndex]) -> Option<NodeIndex> {
    blocks
        .iter()
        .copied()
        .find(|&candidate| blocks.iter().all(|&b| is_path_exists(mth, candidate, b)))
}

/// `root` and every block it dominates, in index order; the exit is excluded
pub fn dominated_blocks(
    mth: &MethodNode,
    dominators: &Dominators<NodeIndex>,
    root: NodeIndex,
) -> Vec<NodeIndex> {
    mth.graph()
        .node_indices()
        .filter(|&node| node != mth.exit())
        .filter(|&node| {
            dominators
                .dominators(node)
                .map_or(false, |mut chain| chain.any(|d| d == root))
        })
        .collect()
}

/// Closest block on the dominator chains of both nodes
pub fn common_dominator(
    dominators: &Dominators<NodeIndex>,
    a: NodeIndex,
    b: NodeIndex,
) -> Option<NodeIndex> {
    let chain: HashSet<NodeIndex> = dominators.dominators(a)?.collect();
    let found = dominators.dominators(b)?.find(|d| chain.contains(d));
    found
}

/// Closest common post-dominator, computed on the post-dominator tree
pub fn common_post_dominator(
    mth: &MethodNode,
    a: NodeIndex,
    b: NodeIndex,
) -> Option<NodeIndex> {
    let post = mth.post_dominators().ok()?;
    common_dominator(post, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompiler::Pass;
    use crate::ir::MethodBuilder;
    use crate::cfg::BlockAnalysisPass;
    use crate::DecompileOptions;

    fn diamond() -> MethodNode {
        let mut b = MethodBuilder::new("diamond");
        let top = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();
        let cond = b.var(0);
        b.if_test(top, cond);
        b.invoke(left, "l()V", vec![]);
        b.invoke(right, "r()V", vec![]);
        b.ret(join);
        b.edge(top, left).edge(top, right).edge(left, join).edge(right, join);
        let mut mth = b.load().unwrap();
        BlockAnalysisPass
            .run(&mut mth, &DecompileOptions::default())
            .unwrap();
        mth
    }

    #[test]
    fn test_successor_order_is_insertion_order() {
        let mth = diamond();
        let succ = clean_successors(&mth, NodeIndex::new(0));
        assert_eq!(succ, vec![NodeIndex::new(1), NodeIndex::new(2)]);
        assert_eq!(
            predecessors(&mth, NodeIndex::new(3)),
            vec![NodeIndex::new(1), NodeIndex::new(2)]
        );
    }

    #[test]
    fn test_top_and_bottom_blocks() {
        let mth = diamond();
        let all: Vec<NodeIndex> = (0..4).map(NodeIndex::new).collect();
        assert_eq!(top_block(&mth, &all), Some(NodeIndex::new(0)));
        assert_eq!(bottom_block(&mth, &all), Some(NodeIndex::new(3)));
        assert_eq!(bottom_block(&mth, &all[1..3]), None);
    }

    #[test]
    fn test_common_post_dominator_of_branches() {
        let mth = diamond();
        assert_eq!(
            common_post_dominator(&mth, NodeIndex::new(1), NodeIndex::new(2)),
            Some(NodeIndex::new(3))
        );
    }

    #[test]
    fn test_collect_successors_until_excludes_terminus() {
        let mth = diamond();
        let blocks = collect_successors_until(&mth, NodeIndex::new(0), NodeIndex::new(3), true);
        assert_eq!(blocks.len(), 3);
        assert!(!blocks.contains(&NodeIndex::new(3)));
    }
}
