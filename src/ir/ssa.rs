//! SSA variables and code variables
//!
//! Every register operand points at an SSA variable. SSA variables that share a
//! [`CodeVarId`] render as the same source variable.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::insn::InsnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SsaVarId(pub u32);

impl SsaVarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Logical source variable shared by one or more SSA variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeVarId(pub u32);

impl fmt::Display for CodeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// Source-level debug info attached to a variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SsaVar {
    pub reg: u16,
    pub version: u32,
    pub debug_info: Option<DebugInfo>,
    /// Instruction assigning this variable, if any
    pub def: Option<InsnId>,
    pub code_var: CodeVarId,
}

impl SsaVar {
    pub fn same_code_var(&self, other: &SsaVar) -> bool {
        self.code_var == other.code_var
    }

    /// Debug info is only meaningful when both sides carry it
    pub fn same_debug_info(&self, other: &SsaVar) -> bool {
        matches!((&self.debug_info, &other.debug_info), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for SsaVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}_{}", self.reg, self.version)
    }
}
