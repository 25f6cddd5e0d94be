//! Finally extraction
//!
//! Compilers emit a `finally` clause as a catch-all handler that runs the
//! clause and rethrows, plus one inlined copy of the clause on every other way
//! out of the try block. This module finds those copies, keeps the handler's
//! instructions as the canonical body and suppresses every copy so later
//! stages can print a single `finally { ... }`.
//!
//! Two search strategies are used. The block matcher in [`matcher`] handles
//! the common shape where each copy sits in a straight run of blocks. The
//! [`traverser`] engine walks both regions upward in step and copes with
//! branches and joins inside the copy. Nothing is committed until every copy
//! has been accounted for.

pub mod apply;
pub mod centrality;
pub mod extract;
pub mod matcher;
pub mod session;
pub mod slice;
pub mod strategy;
pub mod traverser;

pub use extract::{process_try_blocks, TryOutcome};
pub use session::{FinallyBody, FinallyExtractInfo};
pub use slice::InsnsSlice;

use crate::decompiler::{DecompileOptions, Pass};
use crate::error::Result;
use crate::ir::MethodNode;

/// Extraction as a pipeline pass. Hard failures roll the method back.
pub struct MarkFinallyPass;

impl Pass for MarkFinallyPass {
    fn name(&self) -> &'static str {
        "mark-finally"
    }

    fn run(&self, mth: &mut MethodNode, options: &DecompileOptions) -> Result<()> {
        if !options.extract_finally || mth.active_try_blocks().is_empty() {
            return Ok(());
        }
        process_try_blocks(mth, options)
    }

    fn rollback_on_error(&self) -> bool {
        true
    }
}
