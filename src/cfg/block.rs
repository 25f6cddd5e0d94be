//! Basic block module
//!
//! This module contains the Block struct and related functionality.

use crate::ir::InsnId;
use serde::Serialize;

/// Markers set on blocks by analysis and extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockFlags {
    /// Source of at least one loop back edge
    pub loop_end: bool,
    /// Every instruction is suppressed
    pub suppressed: bool,
    /// Every instruction belongs to the canonical finally body
    pub finally: bool,
}

/// Basic block holding instruction ids from the method arena
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub insns: Vec<InsnId>,
    pub flags: BlockFlags,
    exit: bool,
}

impl Block {
    /// Create a new empty basic block
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the synthetic exit block
    pub fn exit() -> Self {
        Self {
            exit: true,
            ..Self::default()
        }
    }

    pub fn is_exit(&self) -> bool {
        self.exit
    }

    /// Get all instructions
    pub fn instructions(&self) -> &[InsnId] {
        &self.insns
    }

    /// Get the number of instructions in this block
    pub fn instruction_count(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Get the last instruction in this block
    pub fn last_instruction(&self) -> Option<InsnId> {
        self.insns.last().copied()
    }

    pub fn first_instruction(&self) -> Option<InsnId> {
        self.insns.first().copied()
    }
}
