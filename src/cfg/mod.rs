//! Control Flow Graph (CFG) module
//!
//! Edge kinds, basic blocks, dominator-based analysis and path helpers over the
//! method graph.

pub mod analysis;
pub mod block;
pub mod paths;
pub mod visualization;

pub use analysis::BlockAnalysisPass;
pub use block::{Block, BlockFlags};

/// Edge kind in the control flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Regular control transfer, including fallthrough and returns into the exit
    Normal,
    /// Edge from a protected block into an exception handler
    Exception,
}

impl EdgeKind {
    pub fn is_exception(self) -> bool {
        self == EdgeKind::Exception
    }
}
