//! Instruction slices
//!
//! An ordered, deduplicated capture of instructions together with their owning
//! block. A slice grows while a match is being built and is locked once it is
//! complete.

use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use std::fmt;

use crate::ir::{InsnId, MethodNode};

#[derive(Debug, Clone, Default)]
pub struct InsnsSlice {
    insns: Vec<(InsnId, NodeIndex)>,
    seen: HashSet<InsnId>,
    complete: bool,
}

impl InsnsSlice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction. Complete slices and duplicates are ignored.
    pub fn add_insn(&mut self, insn: InsnId, block: NodeIndex) -> bool {
        if self.complete || !self.seen.insert(insn) {
            return false;
        }
        self.insns.push((insn, block));
        true
    }

    pub fn add_insns(&mut self, insns: &[InsnId], block: NodeIndex) {
        for &insn in insns {
            self.add_insn(insn, block);
        }
    }

    /// Append every instruction of a block
    pub fn add_block(&mut self, mth: &MethodNode, block: NodeIndex) {
        self.add_insns(mth.block_insns(block), block);
    }

    pub fn insns(&self) -> impl Iterator<Item = InsnId> + '_ {
        self.insns.iter().map(|(insn, _)| *insn)
    }

    pub fn entries(&self) -> &[(InsnId, NodeIndex)] {
        &self.insns
    }

    pub fn get(&self, index: usize) -> Option<InsnId> {
        self.insns.get(index).map(|(insn, _)| *insn)
    }

    pub fn contains(&self, insn: InsnId) -> bool {
        self.seen.contains(&insn)
    }

    /// Owning blocks in first-seen order
    pub fn blocks(&self) -> Vec<NodeIndex> {
        let mut blocks = Vec::new();
        for (_, block) in &self.insns {
            if !blocks.contains(block) {
                blocks.push(*block);
            }
        }
        blocks
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    /// Drop provisional content; complete slices are kept as they are
    pub fn reset_incomplete(&mut self) {
        if !self.complete {
            self.insns.clear();
            self.seen.clear();
        }
    }
}

impl fmt::Display for InsnsSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.insns().map(|id| id.to_string()).collect();
        write!(
            f,
            "[{}]{}",
            ids.join(", "),
            if self.complete { " complete" } else { "" }
        )
    }
}
