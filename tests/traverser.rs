use std::collections::HashSet;

use finally_dec_rs::cfg::BlockAnalysisPass;
use finally_dec_rs::decompiler::Pass;
use finally_dec_rs::finally::centrality::CentralityState;
use finally_dec_rs::finally::traverser::{
    ActivePathState, TraverserContext, TraverserController, TraverserError, TraverserState,
};
use finally_dec_rs::finally::FinallyBody;
use finally_dec_rs::trycatch::HandlerId;
use finally_dec_rs::{DecompileOptions, MethodBuilder, MethodNode};
use petgraph::graph::NodeIndex;

/// Normal copy and handler both shaped `if (c) left(); else right(); tail();`
fn diamond(left: &str, right: &str, tail: &str) -> MethodNode {
    let mut b = MethodBuilder::new("Diamond.run(Z)V");
    let body = b.block();
    let n0 = b.block();
    let n1 = b.block();
    let n2 = b.block();
    let n3 = b.block();
    let f0 = b.block();
    let f1 = b.block();
    let f2 = b.block();
    let f3 = b.block();
    let cond = b.var(1);

    b.invoke(body, "work()V", vec![]);
    b.if_test(n0, cond);
    b.invoke(n1, left, vec![]);
    b.invoke(n2, right, vec![]);
    b.invoke(n3, tail, vec![]);
    b.ret(n3);

    let t = b.move_exception(f0, 0);
    b.if_test(f0, cond);
    b.invoke(f1, "a()V", vec![]);
    b.invoke(f2, "b()V", vec![]);
    b.invoke(f3, "z()V", vec![]);
    b.throw(f3, t);

    b.edge(body, n0).edge(n0, n1).edge(n0, n2).edge(n1, n3).edge(n2, n3);
    b.edge(f0, f1).edge(f0, f2).edge(f1, f3).edge(f2, f3);
    b.try_block(&[body], &[(f0, &[][..])]);

    let mut mth = b.load().unwrap();
    BlockAnalysisPass
        .run(&mut mth, &DecompileOptions::default())
        .unwrap();
    mth
}

fn explore(mth: &MethodNode, limit: usize) -> Result<Vec<ActivePathState>, TraverserError> {
    let body = FinallyBody::collect(mth, HandlerId(0)).unwrap();
    let finally_universe: HashSet<NodeIndex> = body.handler_blocks.iter().copied().collect();
    let candidate_universe: HashSet<NodeIndex> = (0..5).map(NodeIndex::new).collect();
    let mut ctx = TraverserContext::new(
        mth,
        &finally_universe,
        &candidate_universe,
        &body.excluded,
        limit,
    );
    let start = |block| TraverserState::NoBlock {
        centrality: CentralityState::new(true, true),
        block,
        join: false,
    };
    TraverserController::new().process(&mut ctx, ActivePathState::new(start(mth.exit()), start(mth.exit())))
}

fn full_matches(results: &[ActivePathState]) -> usize {
    results.iter().filter(|r| r.matched().len() == 4).count()
}

#[test]
fn test_diamond_matches_through_join() {
    let mth = diamond("a()V", "b()V", "z()V");
    let results = explore(&mth, 1_000).unwrap();
    assert_eq!(full_matches(&results), 1);

    let path = results.iter().find(|r| r.matched().len() == 4).unwrap();
    let candidate: HashSet<_> = path.matched().iter().map(|(_, c)| *c).collect();
    for block in 1..5 {
        for id in mth.block_insns(NodeIndex::new(block)) {
            let is_return = mth.insn(*id).kind == finally_dec_rs::ir::InsnKind::Return;
            assert_eq!(candidate.contains(id), !is_return);
        }
    }
}

#[test]
fn test_swapped_branches_match_by_permutation() {
    let mth = diamond("b()V", "a()V", "z()V");
    let results = explore(&mth, 1_000).unwrap();
    assert_eq!(full_matches(&results), 1);
}

#[test]
fn test_different_tail_never_matches_fully() {
    let mth = diamond("a()V", "b()V", "w()V");
    let results = explore(&mth, 1_000).unwrap();
    assert_eq!(full_matches(&results), 0);
}

#[test]
fn test_budget_exhaustion() {
    let mth = diamond("a()V", "b()V", "z()V");
    let err = explore(&mth, 3).unwrap_err();
    assert_eq!(err, TraverserError::ExplorationLimit { limit: 3 });
    assert!(err.is_soft());
}
