//! Joint state of one (finally, candidate) comparison path
//!
//! Collections shared between forks sit behind `Rc` and are copied on first
//! write, so forking a path is cheap and no two forks ever mutate the same
//! collection.

use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::state::{Side, TerminalReason, TraverserBlockInfo, TraverserState};
use crate::ir::InsnId;

/// Per block, the instruction indices (counted from the bottom) not yet claimed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockCompletionMonitor {
    open: BTreeMap<NodeIndex, BTreeSet<usize>>,
}

impl BlockCompletionMonitor {
    pub fn register(&mut self, info: &TraverserBlockInfo, matched: usize) {
        let open = self
            .open
            .entry(info.block)
            .or_insert_with(|| (0..info.insns.len()).collect());
        let base = info.bottom_implicit_count + info.bottom_offset;
        for i in 0..matched {
            open.remove(&(base + i));
        }
        if info.bottom_offset == 0 {
            for i in 0..info.bottom_implicit_count {
                open.remove(&i);
            }
        }
    }

    pub fn is_consumed(&self, block: NodeIndex) -> bool {
        self.open.get(&block).map_or(false, |open| open.is_empty())
    }

    pub fn consumed_blocks(&self) -> Vec<NodeIndex> {
        self.open
            .iter()
            .filter(|(_, open)| open.is_empty())
            .map(|(block, _)| *block)
            .collect()
    }

    /// An index stays open only if it is open on both sides
    pub fn merge(&mut self, other: &BlockCompletionMonitor) {
        for (block, other_open) in &other.open {
            match self.open.get_mut(block) {
                Some(open) => open.retain(|idx| other_open.contains(idx)),
                None => {
                    self.open.insert(*block, other_open.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivePathState {
    finally: TraverserState,
    candidate: TraverserState,
    matched: Rc<BTreeSet<(InsnId, InsnId)>>,
    finally_monitor: Rc<BlockCompletionMonitor>,
    candidate_monitor: Rc<BlockCompletionMonitor>,
}

impl ActivePathState {
    pub fn new(finally: TraverserState, candidate: TraverserState) -> Self {
        Self {
            finally,
            candidate,
            matched: Rc::default(),
            finally_monitor: Rc::default(),
            candidate_monitor: Rc::default(),
        }
    }

    pub fn state(&self, side: Side) -> &TraverserState {
        match side {
            Side::Finally => &self.finally,
            Side::Candidate => &self.candidate,
        }
    }

    pub fn set_state(&mut self, side: Side, state: TraverserState) {
        match side {
            Side::Finally => self.finally = state,
            Side::Candidate => self.candidate = state,
        }
    }

    pub fn finally(&self) -> &TraverserState {
        &self.finally
    }

    pub fn candidate(&self) -> &TraverserState {
        &self.candidate
    }

    /// Same bookkeeping, new cursor states
    pub fn with_states(&self, finally: TraverserState, candidate: TraverserState) -> Self {
        Self {
            finally,
            candidate,
            matched: Rc::clone(&self.matched),
            finally_monitor: Rc::clone(&self.finally_monitor),
            candidate_monitor: Rc::clone(&self.candidate_monitor),
        }
    }

    /// Independent branch of this path
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Both cursors stop for the same reason
    pub fn terminated(&self, reason: TerminalReason) -> Self {
        self.with_states(TraverserState::Terminal(reason), TraverserState::Terminal(reason))
    }

    pub fn matched(&self) -> &BTreeSet<(InsnId, InsnId)> {
        &self.matched
    }

    pub fn add_matched(&mut self, pairs: impl IntoIterator<Item = (InsnId, InsnId)>) {
        Rc::make_mut(&mut self.matched).extend(pairs);
    }

    pub fn is_candidate_claimed(&self, insn: InsnId) -> bool {
        self.matched.iter().any(|(_, candidate)| *candidate == insn)
    }

    pub fn register(&mut self, side: Side, info: &TraverserBlockInfo, matched: usize) {
        let monitor = match side {
            Side::Finally => &mut self.finally_monitor,
            Side::Candidate => &mut self.candidate_monitor,
        };
        Rc::make_mut(monitor).register(info, matched);
    }

    pub fn monitor(&self, side: Side) -> &BlockCompletionMonitor {
        match side {
            Side::Finally => &self.finally_monitor,
            Side::Candidate => &self.candidate_monitor,
        }
    }

    pub fn merge_monitor(&mut self, side: Side, other: &BlockCompletionMonitor) {
        let monitor = match side {
            Side::Finally => &mut self.finally_monitor,
            Side::Candidate => &mut self.candidate_monitor,
        };
        Rc::make_mut(monitor).merge(other);
    }

    /// Fold in the results of reconverging branches
    pub fn merge_with(&mut self, others: &[ActivePathState]) {
        for other in others {
            if !Rc::ptr_eq(&self.matched, &other.matched) {
                let pairs: Vec<_> = other.matched.iter().copied().collect();
                self.add_matched(pairs);
            }
            if !Rc::ptr_eq(&self.finally_monitor, &other.finally_monitor) {
                self.merge_monitor(Side::Finally, &other.finally_monitor);
            }
            if !Rc::ptr_eq(&self.candidate_monitor, &other.candidate_monitor) {
                self.merge_monitor(Side::Candidate, &other.candidate_monitor);
            }
        }
    }

    pub fn fully_matched_blocks(&self, side: Side) -> Vec<NodeIndex> {
        self.monitor(side).consumed_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finally::centrality::CentralityState;

    fn info(block: usize, len: usize) -> TraverserBlockInfo {
        TraverserBlockInfo {
            block: NodeIndex::new(block),
            insns: (0..len as u32).map(InsnId).collect(),
            top_offset: 0,
            bottom_offset: 0,
            bottom_implicit_count: 0,
        }
    }

    fn path() -> ActivePathState {
        let state = TraverserState::NewBlock {
            centrality: CentralityState::new(true, true),
            block: NodeIndex::new(0),
        };
        ActivePathState::new(state.clone(), state)
    }

    #[test]
    fn test_monitor_consumes_in_steps() {
        let mut monitor = BlockCompletionMonitor::default();
        let mut block = info(1, 3);
        monitor.register(&block, 2);
        assert!(!monitor.is_consumed(NodeIndex::new(1)));
        block.bottom_offset = 2;
        monitor.register(&block, 1);
        assert!(monitor.is_consumed(NodeIndex::new(1)));
    }

    #[test]
    fn test_monitor_counts_skipped_path_ends() {
        let mut monitor = BlockCompletionMonitor::default();
        let mut block = info(1, 2);
        block.bottom_implicit_count = 1;
        monitor.register(&block, 1);
        assert!(monitor.is_consumed(NodeIndex::new(1)));
    }

    #[test]
    fn test_fork_does_not_share_writes() {
        let mut original = path();
        original.add_matched([(InsnId(0), InsnId(10))]);
        let mut fork = original.fork();
        fork.add_matched([(InsnId(1), InsnId(11))]);
        fork.register(Side::Candidate, &info(5, 1), 1);

        assert_eq!(original.matched().len(), 1);
        assert_eq!(fork.matched().len(), 2);
        assert!(original.fully_matched_blocks(Side::Candidate).is_empty());
        assert_eq!(fork.fully_matched_blocks(Side::Candidate), vec![NodeIndex::new(5)]);
    }

    #[test]
    fn test_merge_collects_branch_results() {
        let base = path();
        let mut left = base.fork();
        left.add_matched([(InsnId(0), InsnId(10))]);
        left.register(Side::Finally, &info(2, 2), 1);
        let mut right = base.fork();
        right.add_matched([(InsnId(1), InsnId(11))]);
        let mut second = info(2, 2);
        second.bottom_offset = 1;
        right.register(Side::Finally, &second, 1);

        let mut merged = base.fork();
        merged.merge_with(&[left, right]);
        assert_eq!(merged.matched().len(), 2);
        assert!(merged.monitor(Side::Finally).is_consumed(NodeIndex::new(2)));
        assert!(merged.is_candidate_claimed(InsnId(11)));
    }
}
