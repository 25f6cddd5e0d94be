//! Block-chain matcher
//!
//! Finds a copy of the finally body inside one candidate block, following the
//! body's own successors into the candidate's successors when the body spans
//! several blocks.

use petgraph::graph::NodeIndex;

use super::session::FinallyExtractInfo;
use super::slice::InsnsSlice;
use super::strategy::{DefaultSameInstructions, SameInstructionsStrategy};
use crate::cfg::paths::clean_successors;
use crate::ir::{InsnId, InsnKind, MethodNode};

/// Outcome of comparing a candidate block against a body block from the top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMatch {
    Mismatch,
    /// Both blocks matched completely
    Full,
    /// The body block matched a leading run of a longer candidate block
    Partial,
}

/// Try one candidate block as the start of a duplicate. Each block is tried
/// once per session, whatever the outcome.
pub fn search_duplicate_insns(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    block: NodeIndex,
) -> bool {
    if info.is_in_handler_region(block) || !info.mark_checked(block) {
        return false;
    }
    match search_from_first_block(mth, info, block) {
        Some(slice) => {
            log::trace!("{}: duplicate {} in block {}", mth.name(), slice, block.index());
            info.add_duplicate(slice)
        }
        None => {
            info.reset_incomplete();
            false
        }
    }
}

pub fn search_from_first_block(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    dup_block: NodeIndex,
) -> Option<InsnsSlice> {
    let start = info.start_block();
    let canonical_len = info
        .finally_slice()
        .is_complete()
        .then(|| info.finally_slice().len());
    let mut slice = is_start_block(mth, info, dup_block, start)?;
    if !slice.is_complete() && !check_blocks_tree(mth, info, dup_block, start, &mut slice) {
        return None;
    }
    // A tail match only knows its full length after the successor walk
    if let Some(len) = canonical_len {
        if slice.len() != len {
            log::debug!(
                "{}: duplicate {} has {} insns, finally has {}",
                mth.name(),
                slice,
                slice.len(),
                len
            );
            return None;
        }
    }
    check_temp_slice(mth, slice)
}

/// Match the start block of the body against the tail of `dup_block`, or
/// against a run in the middle of it.
fn is_start_block(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    dup_block: NodeIndex,
    finally_block: NodeIndex,
) -> Option<InsnsSlice> {
    let dup_insns = mth.block_insns(dup_block);
    let finally_insns = info.body.template(mth, finally_block);
    if finally_insns.is_empty() || dup_insns.len() < finally_insns.len() {
        return None;
    }

    let strategy = DefaultSameInstructions;
    let tail = dup_insns.len() - finally_insns.len();
    let (start, end, complete) = if check_insns(mth, &strategy, dup_insns, &finally_insns, tail) {
        (tail, dup_insns.len(), false)
    } else {
        let offset = (0..tail).find(|&i| check_insns(mth, &strategy, dup_insns, &finally_insns, i))?;
        (offset, offset + finally_insns.len(), true)
    };

    let mut slice = InsnsSlice::new();
    slice.add_insns(&dup_insns[start..end], dup_block);

    let finally_slice = info.finally_slice_mut();
    if !finally_slice.is_complete() {
        finally_slice.add_insns(&finally_insns, finally_block);
    }
    if complete {
        slice.set_complete(true);
        finally_slice.set_complete(true);
    }
    Some(slice)
}

/// Compare `template` with the run of `dup` starting at `delta`, bottom-up
fn check_insns(
    mth: &MethodNode,
    strategy: &impl SameInstructionsStrategy,
    dup: &[InsnId],
    template: &[InsnId],
    delta: usize,
) -> bool {
    if delta + template.len() > dup.len() {
        return false;
    }
    template
        .iter()
        .enumerate()
        .rev()
        .all(|(i, &insn)| strategy.same_insns(mth, insn, dup[delta + i]))
}

/// Walk the clean successors of both sides in step while the body continues
fn check_blocks_tree(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    dup_block: NodeIndex,
    finally_block: NodeIndex,
    dup_slice: &mut InsnsSlice,
) -> bool {
    let finally_succ = clean_successors(mth, finally_block);
    let dup_succ = clean_successors(mth, dup_block);
    let continues = finally_succ.iter().any(|b| info.is_handler_block(*b));

    if continues {
        if finally_succ.len() != dup_succ.len() {
            return false;
        }
        for (&fin, &dup) in finally_succ.iter().zip(&dup_succ) {
            if !info.is_handler_block(fin) || info.is_in_handler_region(dup) {
                continue;
            }
            match compare_blocks(mth, info, dup, fin, dup_slice) {
                BlockMatch::Mismatch => return false,
                BlockMatch::Partial => {}
                BlockMatch::Full => {
                    dup_slice.add_block(mth, dup);
                    let template = info.body.template(mth, fin);
                    info.finally_slice_mut().add_insns(&template, fin);
                    if !check_blocks_tree(mth, info, dup, fin, dup_slice) {
                        return false;
                    }
                }
            }
        }
    }

    dup_slice.set_complete(true);
    info.finally_slice_mut().set_complete(true);
    true
}

fn compare_blocks(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    dup_block: NodeIndex,
    finally_block: NodeIndex,
    dup_slice: &mut InsnsSlice,
) -> BlockMatch {
    let dup_insns = mth.block_insns(dup_block);
    let finally_insns = info.body.template(mth, finally_block);
    if finally_insns.is_empty() {
        return if dup_insns.is_empty() {
            BlockMatch::Full
        } else {
            BlockMatch::Mismatch
        };
    }
    if dup_insns.len() < finally_insns.len() {
        return BlockMatch::Mismatch;
    }
    let strategy = DefaultSameInstructions;
    let same = finally_insns
        .iter()
        .zip(dup_insns)
        .all(|(&fin, &dup)| strategy.same_insns(mth, fin, dup));
    if !same {
        return BlockMatch::Mismatch;
    }
    if dup_insns.len() == finally_insns.len() {
        return BlockMatch::Full;
    }

    dup_slice.add_insns(&dup_insns[..finally_insns.len()], dup_block);
    dup_slice.set_complete(true);
    let finally_slice = info.finally_slice_mut();
    finally_slice.add_insns(&finally_insns, finally_block);
    finally_slice.set_complete(true);
    BlockMatch::Partial
}

/// A lone conditional branch is too weak to count as a duplicate
fn check_temp_slice(mth: &MethodNode, slice: InsnsSlice) -> Option<InsnsSlice> {
    match slice.get(0) {
        None => None,
        Some(only) if slice.len() == 1 && mth.insn(only).kind == InsnKind::If => None,
        Some(_) => Some(slice),
    }
}
