//! Memoized results per block pair

use petgraph::graph::NodeIndex;
use std::collections::{BTreeSet, HashMap};

use super::path::{ActivePathState, BlockCompletionMonitor};
use super::state::{Side, TraverserState};
use crate::ir::InsnId;

/// How one explored path ended, relative to where the block pair was entered
#[derive(Debug, Clone)]
pub struct CachedPath {
    pub finally: TraverserState,
    pub candidate: TraverserState,
    /// Pairs matched after entering the block pair
    pub matched: BTreeSet<(InsnId, InsnId)>,
    pub finally_monitor: BlockCompletionMonitor,
    pub candidate_monitor: BlockCompletionMonitor,
}

impl CachedPath {
    pub fn from_result(base: &BTreeSet<(InsnId, InsnId)>, result: &ActivePathState) -> Self {
        Self {
            finally: result.finally().clone(),
            candidate: result.candidate().clone(),
            matched: result.matched().difference(base).copied().collect(),
            finally_monitor: result.monitor(Side::Finally).clone(),
            candidate_monitor: result.monitor(Side::Candidate).clone(),
        }
    }

    /// Continue `path` as if it had explored this result itself
    pub fn recover(&self, path: &ActivePathState) -> ActivePathState {
        let mut recovered = path.with_states(
            TraverserState::RecoveredFromCache {
                underlying: Box::new(self.finally.clone()),
            },
            TraverserState::RecoveredFromCache {
                underlying: Box::new(self.candidate.clone()),
            },
        );
        recovered.add_matched(self.matched.iter().copied());
        recovered.merge_monitor(Side::Finally, &self.finally_monitor);
        recovered.merge_monitor(Side::Candidate, &self.candidate_monitor);
        recovered
    }
}

/// Lives for one top-level traversal. Keys are unordered block pairs.
#[derive(Debug, Default)]
pub struct TraverserGlobalCommonState {
    entries: HashMap<(NodeIndex, NodeIndex), Vec<CachedPath>>,
}

impl TraverserGlobalCommonState {
    fn key(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn contains(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.entries.contains_key(&Self::key(a, b))
    }

    pub fn get(&self, a: NodeIndex, b: NodeIndex) -> Option<&[CachedPath]> {
        self.entries.get(&Self::key(a, b)).map(Vec::as_slice)
    }

    pub fn insert(&mut self, a: NodeIndex, b: NodeIndex, paths: Vec<CachedPath>) {
        self.entries.insert(Self::key(a, b), paths);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
