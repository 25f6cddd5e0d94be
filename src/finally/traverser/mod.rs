//! Multi-path traversal engine
//!
//! Matches the finally body against a candidate region whose shape the block
//! matcher cannot follow: branches, joins and several exits. Two cursors walk
//! upward from the scope termini in step. Cursors at branch points fork the
//! path, paths that reconverge are merged, and results per block pair are
//! memoized for the rest of the traversal.

pub mod cache;
pub mod controller;
pub mod handlers;
pub mod path;
pub mod state;

pub use cache::TraverserGlobalCommonState;
pub use controller::{TraverserContext, TraverserController};
pub use path::{ActivePathState, BlockCompletionMonitor};
pub use state::{CompareReadiness, Side, TerminalReason, TraverserBlockInfo, TraverserState};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraverserError {
    #[error("exploration limit of {limit} steps exceeded")]
    ExplorationLimit { limit: usize },

    #[error("state {state} carries no centrality")]
    MissingCentrality { state: &'static str },

    #[error("state {state} reached {handler}")]
    UnexpectedState {
        state: &'static str,
        handler: &'static str,
    },

    #[error("analysis unavailable: {0}")]
    Analysis(String),
}

impl TraverserError {
    /// Running out of budget abandons the try block; anything else is a bug
    pub fn is_soft(&self) -> bool {
        matches!(self, TraverserError::ExplorationLimit { .. })
    }
}
