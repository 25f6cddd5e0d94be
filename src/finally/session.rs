//! Finally handler body and the per-try-block extraction session

use petgraph::graph::NodeIndex;
use std::collections::{HashSet, VecDeque};

use super::slice::InsnsSlice;
use crate::cfg::paths::{clean_predecessors, clean_successors};
use crate::ir::{InsnArg, InsnId, InsnKind, MethodNode};
use crate::trycatch::{HandlerId, TryId};

/// Blocks and instructions making up a catch-all handler once the exception
/// plumbing (move-exception and rethrow) is taken away.
#[derive(Debug, Clone)]
pub struct FinallyBody {
    pub handler: HandlerId,
    /// Every block of the handler region
    pub handler_blocks: Vec<NodeIndex>,
    /// Handler blocks left after cutting the exception plumbing, in flow order
    pub blocks: Vec<NodeIndex>,
    /// Move-exception and rethrow instructions
    pub excluded: HashSet<InsnId>,
    pub rethrows: Vec<InsnId>,
}

impl FinallyBody {
    /// Collect the body of a catch-all handler that ends in a rethrow of the
    /// caught exception. Returns `None` when the handler is not shaped like a
    /// compiled finally clause.
    pub fn collect(mth: &MethodNode, handler: HandlerId) -> Option<FinallyBody> {
        let h = mth.handler(handler);
        let handler_blocks = h.blocks.clone();
        if handler_blocks.is_empty() || !h.is_catch_all() {
            return None;
        }

        // The handler must not fall back into ordinary code
        for &block in &handler_blocks {
            if clean_successors(mth, block)
                .iter()
                .any(|s| *s != mth.exit() && !handler_blocks.contains(s))
            {
                return None;
            }
        }

        let mut excluded = HashSet::new();
        let move_exc = mth
            .block(h.entry)
            .first_instruction()
            .filter(|id| mth.insn(*id).kind == InsnKind::MoveException);
        let exc_var = move_exc.and_then(|id| mth.insn(id).result.map(|r| r.var));
        if let Some(id) = move_exc {
            excluded.insert(id);
        }

        let mut rethrows = Vec::new();
        for &block in &handler_blocks {
            let inside = clean_successors(mth, block)
                .iter()
                .any(|s| handler_blocks.contains(s));
            if inside {
                continue;
            }
            let last = mth.block(block).last_instruction()?;
            let insn = mth.insn(last);
            let rethrows_caught = insn.kind == InsnKind::Throw
                && match (insn.args.first(), exc_var) {
                    (Some(InsnArg::Register(reg)), Some(var)) => reg.var == var,
                    _ => false,
                };
            if !rethrows_caught {
                return None;
            }
            rethrows.push(last);
            excluded.insert(last);
        }
        if rethrows.is_empty() {
            return None;
        }

        let mut body = FinallyBody {
            handler,
            handler_blocks,
            blocks: Vec::new(),
            excluded,
            rethrows,
        };
        body.blocks = body.cut_path_ends(mth, h.entry);
        Some(body)
    }

    /// Flow-ordered handler blocks minus empty rethrow paths and the empty
    /// leading chain from the handler entry
    fn cut_path_ends(&self, mth: &MethodNode, entry: NodeIndex) -> Vec<NodeIndex> {
        let mut removed: HashSet<NodeIndex> = HashSet::new();
        for &rethrow in &self.rethrows {
            let Some(block) = mth.insn_block(rethrow) else {
                continue;
            };
            self.remove_empty_up_path(mth, block, &mut removed);
        }

        let mut ordered = Vec::new();
        let mut visited = HashSet::from([entry]);
        let mut queue = VecDeque::from([entry]);
        while let Some(block) = queue.pop_front() {
            ordered.push(block);
            for succ in clean_successors(mth, block) {
                if self.handler_blocks.contains(&succ) && visited.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        // Skip the move-exception entry and any empty chain hanging off it
        let mut current = entry;
        loop {
            if !self.template(mth, current).is_empty() {
                break;
            }
            removed.insert(current);
            match clean_successors(mth, current).as_slice() {
                [next] if self.handler_blocks.contains(next) && !removed.contains(next) => {
                    current = *next
                }
                _ => break,
            }
        }

        ordered.retain(|b| !removed.contains(b));
        ordered
    }

    /// Remove a block with nothing left to compare and walk up while the
    /// predecessor only feeds it.
    fn remove_empty_up_path(&self, mth: &MethodNode, block: NodeIndex, removed: &mut HashSet<NodeIndex>) {
        let mut current = block;
        loop {
            if !self.template(mth, current).is_empty() || !removed.insert(current) {
                return;
            }
            let preds: Vec<NodeIndex> = clean_predecessors(mth, current)
                .into_iter()
                .filter(|p| self.handler_blocks.contains(p))
                .collect();
            match preds.as_slice() {
                [pred] if clean_successors(mth, *pred).len() == 1 => current = *pred,
                _ => return,
            }
        }
    }

    /// Instructions of a block that take part in comparison
    pub fn template(&self, mth: &MethodNode, block: NodeIndex) -> Vec<InsnId> {
        mth.block_insns(block)
            .iter()
            .copied()
            .filter(|id| !self.excluded.contains(id))
            .collect()
    }

    /// Every comparable instruction of the body in flow order
    pub fn template_insns(&self, mth: &MethodNode) -> Vec<InsnId> {
        self.blocks
            .iter()
            .flat_map(|b| self.template(mth, *b))
            .collect()
    }

    pub fn is_empty(&self, mth: &MethodNode) -> bool {
        self.blocks.iter().all(|b| self.template(mth, *b).is_empty())
    }

    pub fn start_block(&self) -> Option<NodeIndex> {
        self.blocks.first().copied()
    }
}

/// State of one extraction attempt for a try block
#[derive(Debug, Clone)]
pub struct FinallyExtractInfo {
    pub try_id: TryId,
    pub body: FinallyBody,
    start_block: NodeIndex,
    body_set: HashSet<NodeIndex>,
    checked_blocks: HashSet<NodeIndex>,
    finally_slice: InsnsSlice,
    duplicate_slices: Vec<InsnsSlice>,
}

impl FinallyExtractInfo {
    pub fn new(try_id: TryId, body: FinallyBody, start_block: NodeIndex) -> Self {
        let body_set = body.blocks.iter().copied().collect();
        Self {
            try_id,
            body,
            start_block,
            body_set,
            checked_blocks: HashSet::new(),
            finally_slice: InsnsSlice::new(),
            duplicate_slices: Vec::new(),
        }
    }

    pub fn handler(&self) -> HandlerId {
        self.body.handler
    }

    pub fn start_block(&self) -> NodeIndex {
        self.start_block
    }

    /// Blocks of the finally body
    pub fn is_handler_block(&self, block: NodeIndex) -> bool {
        self.body_set.contains(&block)
    }

    pub fn is_in_handler_region(&self, block: NodeIndex) -> bool {
        self.body.handler_blocks.contains(&block)
    }

    /// Record a block as attempted; false if it already was
    pub fn mark_checked(&mut self, block: NodeIndex) -> bool {
        self.checked_blocks.insert(block)
    }

    pub fn finally_slice(&self) -> &InsnsSlice {
        &self.finally_slice
    }

    pub fn finally_slice_mut(&mut self) -> &mut InsnsSlice {
        &mut self.finally_slice
    }

    pub fn duplicate_slices(&self) -> &[InsnsSlice] {
        &self.duplicate_slices
    }

    /// Accept a duplicate unless it claims instructions already claimed
    pub fn add_duplicate(&mut self, slice: InsnsSlice) -> bool {
        let claimed = slice.insns().any(|insn| {
            self.finally_slice.contains(insn)
                || self.duplicate_slices.iter().any(|dup| dup.contains(insn))
        });
        if claimed {
            return false;
        }
        self.duplicate_slices.push(slice);
        true
    }

    pub fn reset_incomplete(&mut self) {
        self.finally_slice.reset_incomplete();
    }

    /// Replace both slices at once, used when the traversal engine found them
    pub fn set_slices(&mut self, finally_slice: InsnsSlice, duplicates: Vec<InsnsSlice>) {
        self.finally_slice = finally_slice;
        self.duplicate_slices = duplicates;
    }
}
