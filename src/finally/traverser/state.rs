//! Cursor states of the traversal engine
//!
//! Each side of a comparison (the finally body and the candidate copy) is a
//! cursor moving upward through its own block universe. The cursor's state
//! decides what the controller does with it next.

use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use std::fmt;

use super::TraverserError;
use crate::finally::centrality::CentralityState;
use crate::ir::{InsnId, InsnKind, MethodNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Finally,
    Candidate,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Finally => Side::Candidate,
            Side::Candidate => Side::Finally,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Finally => write!(f, "finally"),
            Side::Candidate => write!(f, "candidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareReadiness {
    NotReady,
    /// At a join point; moves only together with the other side
    AwaitingMerge,
    ReadyToCompare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    NonMatchingInstructions,
    NonMatchingPaths,
    EndOfPath,
    UsedCachedResult,
    UnmergeableState,
    UnresolvableStates,
}

/// Instructions of one block as seen by a cursor. Comparison runs bottom-up
/// over `insns[top_offset..len - bottom_offset - bottom_implicit_count]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraverserBlockInfo {
    pub block: NodeIndex,
    pub insns: Vec<InsnId>,
    pub top_offset: usize,
    pub bottom_offset: usize,
    /// Trailing control-flow instructions left out of comparison
    pub bottom_implicit_count: usize,
}

impl TraverserBlockInfo {
    pub fn new(mth: &MethodNode, block: NodeIndex, excluded: &HashSet<InsnId>) -> Self {
        let insns = mth
            .block_insns(block)
            .iter()
            .copied()
            .filter(|id| !excluded.contains(id))
            .collect();
        Self {
            block,
            insns,
            top_offset: 0,
            bottom_offset: 0,
            bottom_implicit_count: 0,
        }
    }

    /// Leave trailing jumps out of comparison. With `all_path_ends` returns and
    /// throws are left out too.
    pub fn skip_path_ends(&mut self, mth: &MethodNode, all_path_ends: bool) {
        self.bottom_implicit_count = self
            .insns
            .iter()
            .rev()
            .take_while(|id| {
                let kind = mth.insn(**id).kind;
                kind == InsnKind::Goto || (all_path_ends && kind.is_path_end())
            })
            .count();
    }

    pub fn comparable(&self) -> &[InsnId] {
        let end = self
            .insns
            .len()
            .saturating_sub(self.bottom_offset + self.bottom_implicit_count);
        if self.top_offset >= end {
            &[]
        } else {
            &self.insns[self.top_offset..end]
        }
    }

    /// Entered from the bottom with nothing consumed yet
    pub fn is_fresh(&self) -> bool {
        self.top_offset == 0 && self.bottom_offset == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraverserState {
    NewBlock {
        centrality: CentralityState,
        block: NodeIndex,
    },
    NoBlock {
        centrality: CentralityState,
        block: NodeIndex,
        join: bool,
    },
    AwaitingInsnCompare {
        centrality: CentralityState,
        info: TraverserBlockInfo,
    },
    UnknownAdvanceStrategy {
        centrality: CentralityState,
        block: NodeIndex,
        next_blocks: Vec<NodeIndex>,
    },
    IdentifiedScopeWithTerminator {
        centrality: CentralityState,
        roots: Vec<NodeIndex>,
        terminator: Option<NodeIndex>,
    },
    RecoveredFromCache {
        underlying: Box<TraverserState>,
    },
    Terminal(TerminalReason),
}

impl TraverserState {
    pub fn readiness(&self) -> CompareReadiness {
        match self {
            TraverserState::NoBlock { join: true, .. } => CompareReadiness::AwaitingMerge,
            TraverserState::AwaitingInsnCompare { .. }
            | TraverserState::UnknownAdvanceStrategy { .. }
            | TraverserState::IdentifiedScopeWithTerminator { .. } => CompareReadiness::ReadyToCompare,
            _ => CompareReadiness::NotReady,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == CompareReadiness::ReadyToCompare
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TraverserState::RecoveredFromCache { .. } | TraverserState::Terminal(_)
        )
    }

    /// Only meaningful for recovered states: the cached path itself stopped
    /// on a terminal state
    pub fn can_continue(&self) -> bool {
        match self {
            TraverserState::RecoveredFromCache { underlying } => underlying.is_terminal(),
            _ => false,
        }
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        match self {
            TraverserState::Terminal(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn centrality(&self) -> Result<&CentralityState, TraverserError> {
        match self {
            TraverserState::NewBlock { centrality, .. }
            | TraverserState::NoBlock { centrality, .. }
            | TraverserState::AwaitingInsnCompare { centrality, .. }
            | TraverserState::UnknownAdvanceStrategy { centrality, .. }
            | TraverserState::IdentifiedScopeWithTerminator { centrality, .. } => Ok(centrality),
            TraverserState::RecoveredFromCache { underlying } => underlying.centrality(),
            TraverserState::Terminal(_) => Err(TraverserError::MissingCentrality { state: self.name() }),
        }
    }

    pub fn block_info(&self) -> Option<&TraverserBlockInfo> {
        match self {
            TraverserState::AwaitingInsnCompare { info, .. } => Some(info),
            TraverserState::RecoveredFromCache { underlying } => underlying.block_info(),
            _ => None,
        }
    }

    /// Block the cursor currently sits on
    pub fn block(&self) -> Option<NodeIndex> {
        match self {
            TraverserState::NewBlock { block, .. }
            | TraverserState::NoBlock { block, .. }
            | TraverserState::UnknownAdvanceStrategy { block, .. } => Some(*block),
            TraverserState::AwaitingInsnCompare { info, .. } => Some(info.block),
            TraverserState::RecoveredFromCache { underlying } => underlying.block(),
            TraverserState::IdentifiedScopeWithTerminator { .. } | TraverserState::Terminal(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TraverserState::NewBlock { .. } => "NewBlock",
            TraverserState::NoBlock { .. } => "NoBlock",
            TraverserState::AwaitingInsnCompare { .. } => "AwaitingInsnCompare",
            TraverserState::UnknownAdvanceStrategy { .. } => "UnknownAdvanceStrategy",
            TraverserState::IdentifiedScopeWithTerminator { .. } => "IdentifiedScopeWithTerminator",
            TraverserState::RecoveredFromCache { .. } => "RecoveredFromCache",
            TraverserState::Terminal(_) => "Terminal",
        }
    }
}

impl fmt::Display for TraverserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block() {
            Some(block) => write!(f, "{}({})", self.name(), block.index()),
            None => match self {
                TraverserState::Terminal(reason) => write!(f, "Terminal({:?})", reason),
                _ => write!(f, "{}", self.name()),
            },
        }
    }
}
