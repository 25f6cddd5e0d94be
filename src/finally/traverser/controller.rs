//! Traversal controller
//!
//! Drives a path until either cursor terminates, both cursors are frozen by
//! the abort condition, or a step changes nothing. Forked paths are driven to
//! completion one after another.

use petgraph::graph::NodeIndex;
use std::collections::HashSet;

use super::cache::TraverserGlobalCommonState;
use super::handlers;
use super::path::ActivePathState;
use super::state::{CompareReadiness, Side, TerminalReason, TraverserBlockInfo, TraverserState};
use super::TraverserError;
use crate::cfg::paths::clean_predecessors;
use crate::ir::{InsnId, MethodNode};

/// Everything a traversal reads besides the paths themselves
pub struct TraverserContext<'a> {
    pub mth: &'a MethodNode,
    finally_universe: &'a HashSet<NodeIndex>,
    candidate_universe: &'a HashSet<NodeIndex>,
    excluded: &'a HashSet<InsnId>,
    cache: TraverserGlobalCommonState,
    steps: usize,
    limit: usize,
}

impl<'a> TraverserContext<'a> {
    pub fn new(
        mth: &'a MethodNode,
        finally_universe: &'a HashSet<NodeIndex>,
        candidate_universe: &'a HashSet<NodeIndex>,
        excluded: &'a HashSet<InsnId>,
        limit: usize,
    ) -> Self {
        Self {
            mth,
            finally_universe,
            candidate_universe,
            excluded,
            cache: TraverserGlobalCommonState::default(),
            steps: 0,
            limit,
        }
    }

    pub fn universe(&self, side: Side) -> &'a HashSet<NodeIndex> {
        match side {
            Side::Finally => self.finally_universe,
            Side::Candidate => self.candidate_universe,
        }
    }

    pub fn finally_universe(&self) -> &'a HashSet<NodeIndex> {
        self.finally_universe
    }

    pub fn candidate_universe(&self) -> &'a HashSet<NodeIndex> {
        self.candidate_universe
    }

    pub fn block_info(&self, block: NodeIndex) -> TraverserBlockInfo {
        TraverserBlockInfo::new(self.mth, block, self.excluded)
    }

    /// Clean predecessors inside the side's universe
    pub fn predecessors(&self, side: Side, block: NodeIndex) -> Vec<NodeIndex> {
        let universe = self.universe(side);
        clean_predecessors(self.mth, block)
            .into_iter()
            .filter(|p| universe.contains(p))
            .collect()
    }

    pub fn cache(&self) -> &TraverserGlobalCommonState {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TraverserGlobalCommonState {
        &mut self.cache
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn tick(&mut self) -> Result<(), TraverserError> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(TraverserError::ExplorationLimit { limit: self.limit });
        }
        Ok(())
    }
}

pub type AbortCondition = Box<dyn Fn(Side, &TraverserState) -> bool>;

/// Result of one controller step
pub enum Step {
    Continue(ActivePathState),
    /// Speculative branches that still need driving
    Fork(Vec<ActivePathState>),
    /// Paths already driven to their end
    Finished(Vec<ActivePathState>),
}

#[derive(Default)]
pub struct TraverserController {
    abort: Option<AbortCondition>,
}

impl TraverserController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_abort(abort: AbortCondition) -> Self {
        Self { abort: Some(abort) }
    }

    fn aborted(&self, side: Side, state: &TraverserState) -> bool {
        self.abort.as_ref().map_or(false, |abort| abort(side, state))
    }

    /// Drive `path` and every fork of it to the end
    pub fn process(
        &self,
        ctx: &mut TraverserContext<'_>,
        path: ActivePathState,
    ) -> Result<Vec<ActivePathState>, TraverserError> {
        let mut pending = vec![path];
        let mut finished = Vec::new();

        while let Some(mut current) = pending.pop() {
            loop {
                ctx.tick()?;
                if current.finally().is_terminal() || current.candidate().is_terminal() {
                    finished.push(current);
                    break;
                }
                let finally_frozen = self.aborted(Side::Finally, current.finally());
                let candidate_frozen = self.aborted(Side::Candidate, current.candidate());
                if finally_frozen && candidate_frozen {
                    finished.push(current);
                    break;
                }

                match self.advance(ctx, current, finally_frozen, candidate_frozen)? {
                    Step::Continue(next) => current = next,
                    Step::Fork(forks) => {
                        pending.extend(forks.into_iter().rev());
                        break;
                    }
                    Step::Finished(done) => {
                        finished.extend(done);
                        break;
                    }
                }
            }
        }
        Ok(finished)
    }

    fn advance(
        &self,
        ctx: &mut TraverserContext<'_>,
        mut path: ActivePathState,
        finally_frozen: bool,
        candidate_frozen: bool,
    ) -> Result<Step, TraverserError> {
        let finally_ready = path.finally().is_ready();
        let candidate_ready = path.candidate().is_ready();

        if finally_ready && candidate_ready && !finally_frozen && !candidate_frozen {
            if let Some(recovered) = recover_from_cache(ctx, &path) {
                log::trace!("{}: reusing cached block pair", ctx.mth.name());
                return Ok(Step::Fork(recovered));
            }
            return handlers::dispatch(ctx, self, path);
        }

        // One cursor already reached its stop while the other still has work
        if (finally_frozen && candidate_ready) || (candidate_frozen && finally_ready) {
            return Ok(Step::Continue(path.terminated(TerminalReason::NonMatchingPaths)));
        }

        let before = (path.finally().clone(), path.candidate().clone());
        for (side, frozen, other_frozen) in [
            (Side::Finally, finally_frozen, candidate_frozen),
            (Side::Candidate, candidate_frozen, finally_frozen),
        ] {
            if frozen {
                continue;
            }
            let other_waits = other_frozen
                || matches!(
                    path.state(side.other()).readiness(),
                    CompareReadiness::ReadyToCompare | CompareReadiness::AwaitingMerge
                );
            match path.state(side).readiness() {
                CompareReadiness::NotReady => advance_single(ctx, &mut path, side)?,
                CompareReadiness::AwaitingMerge if other_waits => advance_single(ctx, &mut path, side)?,
                _ => {}
            }
        }

        if path.finally() == &before.0 && path.candidate() == &before.1 {
            return Ok(Step::Continue(path.terminated(TerminalReason::UnresolvableStates)));
        }
        Ok(Step::Continue(path))
    }
}

/// Cached results apply only when both cursors enter their block fresh
fn recover_from_cache(ctx: &TraverserContext<'_>, path: &ActivePathState) -> Option<Vec<ActivePathState>> {
    let finally_info = path.finally().block_info()?;
    let candidate_info = path.candidate().block_info()?;
    if !finally_info.is_fresh() || !candidate_info.is_fresh() {
        return None;
    }
    let cached = ctx.cache().get(finally_info.block, candidate_info.block)?;
    Some(cached.iter().map(|entry| entry.recover(path)).collect())
}

/// Move one cursor that does not need the other side
fn advance_single(
    ctx: &mut TraverserContext<'_>,
    path: &mut ActivePathState,
    side: Side,
) -> Result<(), TraverserError> {
    let next = match path.state(side) {
        TraverserState::NewBlock { centrality, block } => {
            if !ctx.universe(side).contains(block) {
                TraverserState::Terminal(TerminalReason::EndOfPath)
            } else {
                let mut info = ctx.block_info(*block);
                info.skip_path_ends(ctx.mth, centrality.allows_non_starting_node());
                if info.comparable().is_empty() {
                    TraverserState::NoBlock {
                        centrality: centrality.clone(),
                        block: *block,
                        join: ctx.predecessors(side, *block).len() > 1,
                    }
                } else {
                    TraverserState::AwaitingInsnCompare {
                        centrality: centrality.clone(),
                        info,
                    }
                }
            }
        }
        TraverserState::NoBlock { centrality, block, .. } => {
            let preds = ctx.predecessors(side, *block);
            match preds.as_slice() {
                [] => TraverserState::Terminal(TerminalReason::EndOfPath),
                [single] => TraverserState::NewBlock {
                    centrality: centrality.clone(),
                    block: *single,
                },
                _ => TraverserState::UnknownAdvanceStrategy {
                    centrality: centrality.clone(),
                    block: *block,
                    next_blocks: preds,
                },
            }
        }
        other => {
            return Err(TraverserError::UnexpectedState {
                state: other.name(),
                handler: "advance_single",
            })
        }
    };
    log::trace!("{} cursor: {} -> {}", side, path.state(side), next);
    path.set_state(side, next);
    Ok(())
}
