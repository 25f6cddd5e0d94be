//! Pair handlers
//!
//! Called by the controller once both cursors are ready. The pair of state
//! variants picks the handler.

use petgraph::graph::NodeIndex;

use super::cache::CachedPath;
use super::controller::{Step, TraverserContext, TraverserController};
use super::path::ActivePathState;
use super::state::{Side, TerminalReason, TraverserBlockInfo, TraverserState};
use super::TraverserError;
use crate::cfg::paths::common_dominator;
use crate::finally::centrality::CentralityState;
use crate::finally::strategy::{RegionSameInstructions, SameInstructionsStrategy};
use crate::ir::{InsnId, MethodNode};

/// Scopes with more roots than this are not matched up root by root
const MAX_PERMUTED_ROOTS: usize = 6;

pub fn dispatch(
    ctx: &mut TraverserContext<'_>,
    controller: &TraverserController,
    path: ActivePathState,
) -> Result<Step, TraverserError> {
    use TraverserState::*;
    match (path.finally(), path.candidate()) {
        (AwaitingInsnCompare { .. }, AwaitingInsnCompare { .. }) => explore_compare(ctx, controller, path),
        (UnknownAdvanceStrategy { .. }, UnknownAdvanceStrategy { .. }) => predecessor_merge(ctx, path),
        (IdentifiedScopeWithTerminator { .. }, IdentifiedScopeWithTerminator { .. }) => {
            merge_path(ctx, path)
        }
        (UnknownAdvanceStrategy { .. }, _) => split(path, Side::Finally),
        (_, UnknownAdvanceStrategy { .. }) => split(path, Side::Candidate),
        _ => Ok(Step::Continue(path.terminated(TerminalReason::UnmergeableState))),
    }
}

/// Compare a fresh block pair and drive the outcome to its end, caching the
/// result for the pair
fn explore_compare(
    ctx: &mut TraverserContext<'_>,
    controller: &TraverserController,
    path: ActivePathState,
) -> Result<Step, TraverserError> {
    let fresh = match (path.finally().block_info(), path.candidate().block_info()) {
        (Some(f), Some(c)) if f.is_fresh() && c.is_fresh() => Some((f.block, c.block)),
        _ => None,
    };
    let compared = compare_insns(ctx, &path)?;
    let Some((finally_block, candidate_block)) = fresh else {
        return Ok(Step::Continue(compared));
    };

    let results = controller.process(ctx, compared)?;
    let cached = results
        .iter()
        .map(|result| CachedPath::from_result(path.matched(), result))
        .collect();
    ctx.cache_mut().insert(finally_block, candidate_block, cached);
    Ok(Step::Finished(results))
}

/// Compare both blocks bottom-up and pick the next states
pub fn compare_insns(
    ctx: &TraverserContext<'_>,
    path: &ActivePathState,
) -> Result<ActivePathState, TraverserError> {
    let (finally_centrality, finally_info) = awaiting_parts(path.finally(), "compare_insns")?;
    let (candidate_centrality, candidate_info) = awaiting_parts(path.candidate(), "compare_insns")?;
    let mth = ctx.mth;

    let strategy = RegionSameInstructions::new(
        ctx.finally_universe(),
        ctx.candidate_universe(),
        finally_centrality.allows_central() && candidate_centrality.allows_central(),
    );

    let finally_insns = finally_info.comparable();
    let candidate_insns = candidate_info.comparable();
    let max = finally_insns.len().min(candidate_insns.len());
    let mut pairs = Vec::with_capacity(max);
    for i in 0..max {
        let finally_insn = finally_insns[finally_insns.len() - 1 - i];
        let candidate_insn = candidate_insns[candidate_insns.len() - 1 - i];
        if path.is_candidate_claimed(candidate_insn)
            || !strategy.same_insns(mth, finally_insn, candidate_insn)
            || !results_compatible(mth, candidate_centrality, finally_insn, candidate_insn)
        {
            break;
        }
        pairs.push((finally_insn, candidate_insn));
    }
    let count = pairs.len();

    let mut next = path.clone();
    next.register(Side::Finally, finally_info, count);
    next.register(Side::Candidate, candidate_info, count);
    next.add_matched(pairs);

    if count == max {
        let finally_state = after_match(ctx, Side::Finally, finally_centrality, finally_info, count, finally_insns.len());
        let candidate_state =
            after_match(ctx, Side::Candidate, candidate_centrality, candidate_info, count, candidate_insns.len());
        next.set_state(Side::Finally, finally_state);
        next.set_state(Side::Candidate, candidate_state);
        return Ok(next);
    }

    if count == 0 {
        // Allow the first block to carry extra code below the copy
        for (side, centrality, info) in [
            (Side::Candidate, candidate_centrality, candidate_info),
            (Side::Finally, finally_centrality, finally_info),
        ] {
            if centrality.allows_non_starting_node() {
                let mut centrality = centrality.duplicate();
                centrality.set_allows_non_starting_node(false);
                let skipped = no_block(ctx, side, centrality, info.block);
                next.set_state(side, skipped);
                return Ok(next);
            }
        }
    }

    Ok(next.terminated(TerminalReason::NonMatchingInstructions))
}

fn awaiting_parts<'s>(
    state: &'s TraverserState,
    handler: &'static str,
) -> Result<(&'s CentralityState, &'s TraverserBlockInfo), TraverserError> {
    match state {
        TraverserState::AwaitingInsnCompare { centrality, info } => Ok((centrality, info)),
        other => Err(TraverserError::UnexpectedState {
            state: other.name(),
            handler,
        }),
    }
}

/// Result registers must agree unless the candidate's output stays local
fn results_compatible(mth: &MethodNode, candidate: &CentralityState, finally_insn: InsnId, candidate_insn: InsnId) -> bool {
    match (mth.insn(finally_insn).result, mth.insn(candidate_insn).result) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            let (var_a, var_b) = (mth.var(a.var), mth.var(b.var));
            a.var == b.var
                || var_a.same_code_var(var_b)
                || var_a.same_debug_info(var_b)
                || candidate.is_allowable_output(b.var)
        }
        _ => false,
    }
}

/// State of one side after every compared instruction matched
fn after_match(
    ctx: &TraverserContext<'_>,
    side: Side,
    centrality: &CentralityState,
    info: &TraverserBlockInfo,
    matched: usize,
    len: usize,
) -> TraverserState {
    let mut centrality = centrality.duplicate();
    centrality.set_allows_central(false);
    centrality.set_allows_non_starting_node(false);
    if matched < len {
        let mut info = info.clone();
        info.bottom_offset += matched;
        return TraverserState::AwaitingInsnCompare { centrality, info };
    }
    no_block(ctx, side, centrality, info.block)
}

fn no_block(ctx: &TraverserContext<'_>, side: Side, centrality: CentralityState, block: NodeIndex) -> TraverserState {
    TraverserState::NoBlock {
        centrality,
        block,
        join: ctx.predecessors(side, block).len() > 1,
    }
}

/// Both cursors face several predecessors: pin the scope they span
fn predecessor_merge(ctx: &mut TraverserContext<'_>, path: ActivePathState) -> Result<Step, TraverserError> {
    let (finally_centrality, finally_next) = unknown_parts(path.finally())?;
    let (candidate_centrality, candidate_next) = unknown_parts(path.candidate())?;
    if finally_next.len() != candidate_next.len() {
        return Ok(Step::Continue(path.terminated(TerminalReason::UnmergeableState)));
    }

    let finally_scope = TraverserState::IdentifiedScopeWithTerminator {
        centrality: finally_centrality.clone(),
        roots: finally_next.to_vec(),
        terminator: scope_terminator(ctx, Side::Finally, finally_next)?,
    };
    let candidate_scope = TraverserState::IdentifiedScopeWithTerminator {
        centrality: candidate_centrality.clone(),
        roots: candidate_next.to_vec(),
        terminator: scope_terminator(ctx, Side::Candidate, candidate_next)?,
    };
    Ok(Step::Continue(path.with_states(finally_scope, candidate_scope)))
}

fn unknown_parts(state: &TraverserState) -> Result<(&CentralityState, &[NodeIndex]), TraverserError> {
    match state {
        TraverserState::UnknownAdvanceStrategy {
            centrality,
            next_blocks,
            ..
        } => Ok((centrality, next_blocks)),
        other => Err(TraverserError::UnexpectedState {
            state: other.name(),
            handler: "predecessor_merge",
        }),
    }
}

/// Nearest common dominator of the roots, if it lies in the side's universe
fn scope_terminator(
    ctx: &TraverserContext<'_>,
    side: Side,
    roots: &[NodeIndex],
) -> Result<Option<NodeIndex>, TraverserError> {
    let doms = ctx
        .mth
        .dominators()
        .map_err(|err| TraverserError::Analysis(err.to_string()))?;
    let mut common = roots.first().copied();
    for &root in roots.iter().skip(1) {
        common = common.and_then(|c| common_dominator(doms, c, root));
    }
    Ok(common.filter(|block| ctx.universe(side).contains(block)))
}

/// Explore every root pair of two scopes up to their terminators and continue
/// from the terminators once all pairs match
fn merge_path(ctx: &mut TraverserContext<'_>, path: ActivePathState) -> Result<Step, TraverserError> {
    let (finally_centrality, finally_roots, finally_term) = scope_parts(path.finally())?;
    let (candidate_centrality, candidate_roots, candidate_term) = scope_parts(path.candidate())?;
    if finally_roots.len() != candidate_roots.len() || candidate_roots.len() > MAX_PERMUTED_ROOTS {
        return Ok(Step::Continue(path.terminated(TerminalReason::NonMatchingPaths)));
    }

    for candidate_order in permutations(&candidate_roots) {
        let controller = TraverserController::with_abort(Box::new(move |side: Side, state: &TraverserState| {
            let terminator = match side {
                Side::Finally => finally_term,
                Side::Candidate => candidate_term,
            };
            terminator.is_some() && state.block() == terminator
        }));

        let mut results = Vec::new();
        for (&finally_root, &candidate_root) in finally_roots.iter().zip(&candidate_order) {
            let sub = path.with_states(
                TraverserState::NewBlock {
                    centrality: finally_centrality.duplicate(),
                    block: finally_root,
                },
                TraverserState::NewBlock {
                    centrality: candidate_centrality.duplicate(),
                    block: candidate_root,
                },
            );
            results.extend(controller.process(ctx, sub)?);
        }

        let open_ended = finally_term.is_none() && candidate_term.is_none();
        let terminus_cached = match (finally_term, candidate_term) {
            (Some(f), Some(c)) => ctx.cache().contains(f, c),
            _ => false,
        };
        let perfect = results.iter().all(|r| is_perfect(r, open_ended));
        if !perfect && !terminus_cached {
            continue;
        }

        let mut finally_next = finally_centrality.duplicate();
        let mut candidate_next = candidate_centrality.duplicate();
        for result in &results {
            if let Ok(c) = result.finally().centrality() {
                finally_next.merge(c);
            }
            if let Ok(c) = result.candidate().centrality() {
                candidate_next.merge(c);
            }
        }

        let next_state = |centrality: CentralityState, terminator: Option<NodeIndex>| match terminator {
            Some(block) => TraverserState::NewBlock { centrality, block },
            None => TraverserState::Terminal(TerminalReason::EndOfPath),
        };
        let mut next = path.with_states(
            next_state(finally_next, finally_term),
            next_state(candidate_next, candidate_term),
        );
        next.merge_with(&results);
        return Ok(Step::Continue(next));
    }

    Ok(Step::Continue(path.terminated(TerminalReason::NonMatchingPaths)))
}

fn scope_parts(
    state: &TraverserState,
) -> Result<(CentralityState, Vec<NodeIndex>, Option<NodeIndex>), TraverserError> {
    match state {
        TraverserState::IdentifiedScopeWithTerminator {
            centrality,
            roots,
            terminator,
        } => Ok((centrality.clone(), roots.clone(), *terminator)),
        other => Err(TraverserError::UnexpectedState {
            state: other.name(),
            handler: "merge_path",
        }),
    }
}

/// A sub-path ended cleanly at the terminators
fn is_perfect(result: &ActivePathState, open_ended: bool) -> bool {
    let (finally, candidate) = (result.finally(), result.candidate());
    if !finally.is_terminal() && !candidate.is_terminal() {
        return true;
    }
    let recovered = |s: &TraverserState| matches!(s, TraverserState::RecoveredFromCache { .. }) && !s.can_continue();
    if recovered(finally) && recovered(candidate) {
        return true;
    }
    open_ended
        && finally.terminal_reason() == Some(TerminalReason::EndOfPath)
        && candidate.terminal_reason() == Some(TerminalReason::EndOfPath)
}

/// Fork the path once per next block of the branching side
fn split(path: ActivePathState, side: Side) -> Result<Step, TraverserError> {
    let (centrality, next_blocks) = match path.state(side) {
        TraverserState::UnknownAdvanceStrategy {
            centrality,
            next_blocks,
            ..
        } => (centrality.clone(), next_blocks.clone()),
        other => {
            return Err(TraverserError::UnexpectedState {
                state: other.name(),
                handler: "split",
            })
        }
    };
    let forks = next_blocks
        .into_iter()
        .map(|block| {
            let mut fork = path.fork();
            fork.set_state(
                side,
                TraverserState::NewBlock {
                    centrality: centrality.duplicate(),
                    block,
                },
            );
            fork
        })
        .collect();
    Ok(Step::Fork(forks))
}

/// Every ordering of `items`, identity first
pub fn permutations(items: &[NodeIndex]) -> Vec<Vec<NodeIndex>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for (i, &first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, first);
            result.push(tail);
        }
    }
    result
}
