//! Per-try-block extraction
//!
//! Picks the catch-all handler of a try block as the finally template, looks
//! for its copies in the other handlers and on the normal exit paths, and
//! decides whether the copies justify extracting a single finally clause.

use petgraph::graph::NodeIndex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::apply::{apply_finally, remove_handler};
use super::centrality::CentralityState;
use super::matcher::search_duplicate_insns;
use super::session::{FinallyBody, FinallyExtractInfo};
use super::slice::InsnsSlice;
use super::traverser::{
    ActivePathState, Side, TraverserContext, TraverserController, TraverserError, TraverserState,
};
use crate::cfg::paths::{clean_predecessors, clean_successors, follow_empty_path, successors};
use crate::decompiler::DecompileOptions;
use crate::error::Result;
use crate::ir::{InsnArg, InsnId, InsnKind, MethodNode, SsaVarId};
use crate::trycatch::edges::{compute_try_edges, try_region};
use crate::trycatch::{
    active_inner_tries, catch_all_handler, has_deep_nesting, merged_handlers, own_handlers,
    TryCatchEdgeBlockMap, TryEdgeScopeGroups, TryId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryOutcome {
    /// No catch-all handler shaped like a finally clause
    NotApplicable,
    /// The catch-all handler had nothing but exception plumbing
    Removed,
    Extracted { merged_inner: bool },
    /// Soft failure; the try block keeps its duplicated form
    Failed(String),
}

/// Run extraction over every active try block of the method, outer blocks
/// first. Soft failures become method comments.
pub fn process_try_blocks(mth: &mut MethodNode, options: &DecompileOptions) -> Result<()> {
    let mut order: Vec<TryId> = mth.active_try_blocks().to_vec();
    order.sort_by_key(|id| (nesting_depth(mth, *id), id.0));

    let mut removed_any = false;
    for &try_id in &order {
        if remove_empty_handler(mth, try_id) {
            removed_any = true;
        }
    }
    if removed_any {
        reset_try_blocks(mth);
    }

    let mut extracted_any = false;
    for &try_id in &order {
        match process_try_block(mth, try_id, options)? {
            TryOutcome::Extracted { merged_inner } => {
                log::debug!(
                    "{}: extracted finally for {}{}",
                    mth.name(),
                    try_id,
                    if merged_inner { " (inner try blocks merged)" } else { "" }
                );
                extracted_any = true;
            }
            TryOutcome::Failed(reason) => {
                log::warn!("{}: finally extraction failed for {}: {}", mth.name(), try_id, reason);
                mth.add_comment(format!("Finally extraction failed for {}: {}", try_id, reason));
            }
            TryOutcome::Removed | TryOutcome::NotApplicable => {}
        }
    }
    if extracted_any {
        reset_try_blocks(mth);
    }
    Ok(())
}

fn nesting_depth(mth: &MethodNode, try_id: TryId) -> usize {
    let mut depth = 0;
    let mut current = mth.try_block(try_id).outer;
    while let Some(outer) = current {
        depth += 1;
        current = mth.try_block(outer).outer;
    }
    depth
}

/// Drop merged and handler-less try blocks from the active list
pub fn reset_try_blocks(mth: &mut MethodNode) {
    let implicit: Vec<TryId> = mth
        .active_try_blocks()
        .iter()
        .copied()
        .filter(|id| own_handlers(mth, *id).is_empty())
        .collect();
    for id in implicit {
        mth.try_block_mut(id).implicit = true;
    }
    mth.retain_active_try_blocks(|try_block| !try_block.is_implicit_or_merged());
}

/// Remove a catch-all handler whose body is empty once the move-exception
/// and rethrow are taken away
fn remove_empty_handler(mth: &mut MethodNode, try_id: TryId) -> bool {
    if mth.try_block(try_id).is_implicit_or_merged() {
        return false;
    }
    let Some(handler) = catch_all_handler(mth, try_id) else {
        return false;
    };
    if mth.handler(handler).is_finally {
        return false;
    }
    match FinallyBody::collect(mth, handler) {
        Some(body) if body.is_empty(mth) => {
            log::debug!("{}: removing empty catch-all {} of {}", mth.name(), handler, try_id);
            remove_handler(mth, &body);
            true
        }
        _ => false,
    }
}

pub fn process_try_block(
    mth: &mut MethodNode,
    try_id: TryId,
    options: &DecompileOptions,
) -> Result<TryOutcome> {
    if mth.try_block(try_id).is_implicit_or_merged() {
        return Ok(TryOutcome::NotApplicable);
    }
    let Some(handler) = catch_all_handler(mth, try_id) else {
        return Ok(TryOutcome::NotApplicable);
    };
    if mth.handler(handler).is_finally {
        return Ok(TryOutcome::NotApplicable);
    }
    let Some(body) = FinallyBody::collect(mth, handler) else {
        return Ok(TryOutcome::NotApplicable);
    };
    let Some(start) = body.start_block() else {
        return Ok(TryOutcome::NotApplicable);
    };
    if has_deep_nesting(mth, try_id) {
        return Ok(TryOutcome::Failed(
            "try blocks nested more than two levels deep are not supported".to_string(),
        ));
    }

    let mut info = FinallyExtractInfo::new(try_id, body.clone(), start);
    let mut merge_inner = extract_simple(mth, &mut info);
    if merge_inner.is_some() {
        if let Err(reason) = check_slices(mth, &info) {
            log::debug!("{}: block matcher result rejected for {}: {}", mth.name(), try_id, reason);
            merge_inner = None;
        }
    }

    if merge_inner.is_none() {
        log::debug!("{}: falling back to traversal for {}", mth.name(), try_id);
        info = FinallyExtractInfo::new(try_id, body, start);
        match extract_with_traversal(mth, &mut info, options) {
            Ok(Some(merge)) => merge_inner = Some(merge),
            Ok(None) => {
                return Ok(TryOutcome::Failed(
                    "no consistent copy of the finally body on every exit path".to_string(),
                ))
            }
            Err(err) if err.is_soft() => return Ok(TryOutcome::Failed(err.to_string())),
            Err(err) => return Err(err.into()),
        }
        if let Err(reason) = check_slices(mth, &info) {
            return Ok(TryOutcome::Failed(reason));
        }
    }

    let merged_inner = merge_inner.unwrap_or(false);
    apply_finally(mth, &info, merged_inner)?;
    Ok(TryOutcome::Extracted { merged_inner })
}

/// Block matcher over the other handlers and the normal exit paths. Returns
/// whether inner try blocks must be merged, or `None` when the copies found
/// do not add up.
fn extract_simple(mth: &MethodNode, info: &mut FinallyExtractInfo) -> Option<bool> {
    let try_id = info.try_id;
    let all_handlers = merged_handlers(mth, try_id);
    let own_count = own_handlers(mth, try_id).len();
    let total = all_handlers.len();

    let mut found = 0;
    for &handler in &all_handlers {
        if handler == info.handler() {
            continue;
        }
        let blocks = mth.handler(handler).blocks.clone();
        if blocks.into_iter().any(|block| search_duplicate_insns(mth, info, block)) {
            found += 1;
        }
    }

    let merge_inner = if found + 1 == total {
        total != own_count
    } else if found + 1 == own_count {
        false
    } else {
        log::debug!(
            "{}: {} of {} handlers carry a copy of the finally body",
            mth.name(),
            found,
            total.saturating_sub(1)
        );
        return None;
    };

    search_up_paths(mth, info).then_some(merge_inner)
}

/// Look for the copy on every normal path that leaves the try body and meets
/// the finally handler's exit
fn search_up_paths(mth: &MethodNode, info: &mut FinallyExtractInfo) -> bool {
    let region: HashSet<NodeIndex> = try_region(mth, info.try_id).into_iter().collect();
    let handler_blocks: HashSet<NodeIndex> = mth
        .handlers()
        .iter()
        .flat_map(|h| h.blocks.iter().copied())
        .collect();
    let body_len = info.body.blocks.len();

    let mut starts = path_starts(mth, info);
    for block in loop_end_starts(mth, &region, &handler_blocks) {
        if !starts.contains(&block) {
            starts.push(block);
        }
    }

    for start in starts {
        let Some(up_path) = collect_up_path(mth, start, &region, &handler_blocks) else {
            continue;
        };
        if up_path.len() < body_len {
            return false;
        }
        // Paths joining above an accepted copy share it
        let shared = info
            .duplicate_slices()
            .iter()
            .any(|dup| dup.blocks().iter().any(|b| up_path.contains(b)));
        if shared {
            continue;
        }
        if !up_path
            .into_iter()
            .any(|block| search_duplicate_insns(mth, info, block))
        {
            return false;
        }
    }
    true
}

/// Predecessors of the point where the finally handler's exit rejoins
/// ordinary flow
fn path_starts(mth: &MethodNode, info: &FinallyExtractInfo) -> Vec<NodeIndex> {
    let mut starts = Vec::new();
    for &rethrow in &info.body.rethrows {
        let Some(bottom) = mth.insn_block(rethrow) else {
            continue;
        };
        let merge = clean_successors(mth, bottom)
            .first()
            .map_or(mth.exit(), |succ| follow_empty_path(mth, *succ));

        for pred in clean_predecessors(mth, merge) {
            let mut candidates = vec![pred];
            if merge == mth.exit() && mth.block(pred).is_empty() {
                candidates = clean_predecessors(mth, pred);
            }
            for candidate in candidates {
                let ends_in_throw = mth
                    .block(candidate)
                    .last_instruction()
                    .map_or(false, |id| mth.insn(id).kind == InsnKind::Throw);
                // Copies inside other handlers were already searched
                let in_handler = mth.handlers().iter().any(|h| h.blocks.contains(&candidate));
                if in_handler || ends_in_throw || starts.contains(&candidate) {
                    continue;
                }
                starts.push(candidate);
            }
        }
    }
    starts
}

/// Normal exits of a try block sitting in a loop body that go straight back
/// to the loop header. The back edge keeps them away from the handler's merge
/// point.
fn loop_end_starts(
    mth: &MethodNode,
    region: &HashSet<NodeIndex>,
    handler_blocks: &HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let Ok(dominators) = mth.dominators() else {
        return Vec::new();
    };
    let encloses_try = |header: NodeIndex| {
        region.iter().all(|&block| {
            dominators
                .dominators(block)
                .map_or(false, |mut chain| chain.any(|d| d == header))
        })
    };

    let mut starts = Vec::new();
    let mut visited = HashSet::new();
    let mut seeds: Vec<NodeIndex> = region.iter().copied().collect();
    seeds.sort();
    let mut queue: VecDeque<NodeIndex> = seeds
        .into_iter()
        .flat_map(|block| clean_successors(mth, block))
        .collect();
    while let Some(block) = queue.pop_front() {
        if region.contains(&block)
            || handler_blocks.contains(&block)
            || block == mth.exit()
            || !visited.insert(block)
        {
            continue;
        }
        let closes_loop = successors(mth, block)
            .into_iter()
            .any(|succ| mth.is_back_edge(block, succ) && encloses_try(succ));
        if closes_loop {
            starts.push(block);
        }
        queue.extend(clean_successors(mth, block));
    }
    starts
}

/// Blocks above `start` in walk order. Inside the try region only region
/// blocks are followed; outside it handler blocks are never entered. `None`
/// when the walk never reaches the try region.
fn collect_up_path(
    mth: &MethodNode,
    start: NodeIndex,
    region: &HashSet<NodeIndex>,
    handler_blocks: &HashSet<NodeIndex>,
) -> Option<Vec<NodeIndex>> {
    let mut path = Vec::new();
    let mut reached = false;
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(block) = queue.pop_front() {
        path.push(block);
        let inside = region.contains(&block);
        reached |= inside;
        for pred in clean_predecessors(mth, block) {
            let follow = if inside {
                region.contains(&pred)
            } else {
                !handler_blocks.contains(&pred)
            };
            if follow && visited.insert(pred) {
                queue.push_back(pred);
            }
        }
    }
    reached.then_some(path)
}

/// Canonical and duplicate slices must line up position by position
pub fn check_slices(mth: &MethodNode, info: &FinallyExtractInfo) -> std::result::Result<(), String> {
    let finally_slice = info.finally_slice();
    let template = info.body.template_insns(mth);
    if let Some(missing) = template.iter().find(|id| !finally_slice.contains(**id)) {
        return Err(format!("finally instruction {} has no counterpart", missing));
    }
    if info.duplicate_slices().is_empty() {
        return Err("no duplicate of the finally body found".to_string());
    }

    let mut claimed = HashSet::new();
    for dup in info.duplicate_slices() {
        if dup.len() != finally_slice.len() {
            return Err(format!(
                "duplicate has {} instructions, finally body has {}",
                dup.len(),
                finally_slice.len()
            ));
        }
        for (canonical, copy) in finally_slice.insns().zip(dup.insns()) {
            if mth.insn(canonical).kind != mth.insn(copy).kind {
                return Err(format!("instruction kinds differ at {} and {}", canonical, copy));
            }
            if !claimed.insert(copy) {
                return Err(format!("instruction {} claimed by two duplicates", copy));
            }
        }
    }
    Ok(())
}

/// Traversal engine over every scope of the try block. Returns whether inner
/// try blocks must be merged, or `None` when some scope has no clean copy.
pub fn extract_with_traversal(
    mth: &MethodNode,
    info: &mut FinallyExtractInfo,
    options: &DecompileOptions,
) -> std::result::Result<Option<bool>, TraverserError> {
    let try_id = info.try_id;
    let map = TryCatchEdgeBlockMap::build(mth, try_id, info.handler(), &info.body.handler_blocks);
    let Some(finally_scope) = map.finally_scope() else {
        return Ok(None);
    };
    let finally_universe: HashSet<NodeIndex> = finally_scope.blocks.iter().copied().collect();
    let template = info.body.template_insns(mth);

    let mut duplicates: Vec<InsnsSlice> = Vec::new();
    let mut scopes = 0;
    for scope in map.candidate_scopes() {
        scopes += 1;
        let candidate_universe: HashSet<NodeIndex> = scope.blocks.iter().copied().collect();
        if candidate_universe.is_empty() {
            return Ok(None);
        }

        let mut ctx = TraverserContext::new(
            mth,
            &finally_universe,
            &candidate_universe,
            &info.body.excluded,
            options.exploration_limit,
        );
        let finally_start = TraverserState::NoBlock {
            centrality: CentralityState::new(true, true),
            block: finally_scope.terminus,
            join: ctx.predecessors(Side::Finally, finally_scope.terminus).len() > 1,
        };
        let candidate_start = TraverserState::NoBlock {
            centrality: CentralityState::new(true, true)
                .with_outputs(local_outputs(mth, &candidate_universe)),
            block: scope.terminus,
            join: ctx.predecessors(Side::Candidate, scope.terminus).len() > 1,
        };
        let results = TraverserController::new()
            .process(&mut ctx, ActivePathState::new(finally_start, candidate_start))?;
        log::trace!(
            "{}: scope {} explored in {} steps, {} paths",
            mth.name(),
            scope.edge,
            ctx.steps(),
            results.len()
        );

        if results.is_empty() {
            return Ok(None);
        }
        for result in &results {
            let Some(slice) = slice_from_path(mth, &template, result) else {
                return Ok(None);
            };
            let known = duplicates
                .iter()
                .any(|dup| dup.insns().eq(slice.insns()));
            if !known {
                duplicates.push(slice);
            }
        }
    }
    if scopes == 0 {
        return Ok(None);
    }

    let mut finally_slice = InsnsSlice::new();
    for &insn in &template {
        if let Some(block) = mth.insn_block(insn) {
            finally_slice.add_insn(insn, block);
        }
    }
    finally_slice.set_complete(true);
    info.set_slices(finally_slice, Vec::new());
    for dup in duplicates {
        if !info.add_duplicate(dup) {
            return Ok(None);
        }
    }

    let groups = TryEdgeScopeGroups::build(mth, &compute_try_edges(mth, try_id));
    let merged_fallthrough = groups
        .merged_scopes()
        .iter()
        .any(|(kept, _)| kept.is_fallthrough());
    Ok(Some(
        !active_inner_tries(mth, try_id).is_empty() && !merged_fallthrough,
    ))
}

/// Duplicate slice in template order, when the path matched every template
/// instruction exactly once
fn slice_from_path(mth: &MethodNode, template: &[InsnId], path: &ActivePathState) -> Option<InsnsSlice> {
    let mut pairs: HashMap<InsnId, InsnId> = HashMap::new();
    for &(finally_insn, candidate_insn) in path.matched() {
        if pairs.insert(finally_insn, candidate_insn).is_some() {
            return None;
        }
    }
    if pairs.len() != template.len() {
        return None;
    }
    let mut slice = InsnsSlice::new();
    for insn in template {
        let copy = *pairs.get(insn)?;
        let block = mth.insn_block(copy)?;
        if !slice.add_insn(copy, block) {
            return None;
        }
    }
    slice.set_complete(true);
    Some(slice)
}

/// Variables assigned inside the universe and never read outside it
fn local_outputs(mth: &MethodNode, universe: &HashSet<NodeIndex>) -> BTreeSet<SsaVarId> {
    let mut defined = BTreeSet::new();
    let mut used_outside = HashSet::new();
    for block in mth.graph().node_indices() {
        for &id in mth.block_insns(block) {
            if universe.contains(&block) {
                if let Some(result) = mth.insn(id).result {
                    defined.insert(result.var);
                }
            } else {
                collect_uses(mth, id, &mut used_outside);
            }
        }
    }
    defined.retain(|var| !used_outside.contains(var));
    defined
}

fn collect_uses(mth: &MethodNode, insn: InsnId, uses: &mut HashSet<SsaVarId>) {
    for arg in &mth.insn(insn).args {
        match arg {
            InsnArg::Register(reg) => {
                uses.insert(reg.var);
            }
            InsnArg::Wrapped(inner) => collect_uses(mth, *inner, uses),
            InsnArg::Literal(_) => {}
        }
    }
}
