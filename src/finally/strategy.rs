//! Instruction equivalence
//!
//! Decides whether two instructions from different copies of a finally body are
//! the same logical operation. Register renaming is tolerated: registers match
//! when they are the same code variable, carry the same debug info, or are
//! assigned by equivalent instructions.

use petgraph::graph::NodeIndex;
use std::collections::HashSet;

use crate::ir::{InsnArg, InsnId, MethodNode, RegArg};

/// Limit for following definitions and wrapped instructions
const MAX_COMPARE_DEPTH: usize = 8;

pub trait SameInstructionsStrategy {
    /// Whether two defining instructions may be compared when register names differ
    fn allow_definition_compare(&self, mth: &MethodNode, finally_def: InsnId, candidate_def: InsnId) -> bool;

    fn same_insns(&self, mth: &MethodNode, a: InsnId, b: InsnId) -> bool {
        self.same_insns_at(mth, a, b, 0)
    }

    fn same_args(&self, mth: &MethodNode, a: &InsnArg, b: &InsnArg) -> bool {
        self.same_args_at(mth, a, b, 0)
    }

    fn same_insns_at(&self, mth: &MethodNode, a: InsnId, b: InsnId, depth: usize) -> bool {
        if a == b {
            return true;
        }
        let (insn_a, insn_b) = (mth.insn(a), mth.insn(b));
        if !insn_a.is_same(insn_b) {
            return false;
        }
        insn_a
            .args
            .iter()
            .zip(&insn_b.args)
            .all(|(arg_a, arg_b)| self.same_args_at(mth, arg_a, arg_b, depth))
    }

    fn same_args_at(&self, mth: &MethodNode, a: &InsnArg, b: &InsnArg, depth: usize) -> bool {
        match (a, b) {
            (InsnArg::Register(reg_a), InsnArg::Register(reg_b)) => {
                self.same_registers(mth, reg_a, reg_b, depth)
            }
            (InsnArg::Literal(lit_a), InsnArg::Literal(lit_b)) => lit_a == lit_b,
            (InsnArg::Wrapped(wrap_a), InsnArg::Wrapped(wrap_b)) => {
                depth < MAX_COMPARE_DEPTH && self.same_insns_at(mth, *wrap_a, *wrap_b, depth + 1)
            }
            _ => false,
        }
    }

    fn same_registers(&self, mth: &MethodNode, a: &RegArg, b: &RegArg, depth: usize) -> bool {
        if a.var == b.var {
            return true;
        }
        let (var_a, var_b) = (mth.var(a.var), mth.var(b.var));
        if var_a.same_code_var(var_b) || var_a.same_debug_info(var_b) {
            return true;
        }
        if depth >= MAX_COMPARE_DEPTH {
            return false;
        }
        let (Some(def_a), Some(def_b)) = (var_a.def, var_b.def) else {
            return false;
        };
        if !self.allow_definition_compare(mth, def_a, def_b) {
            return false;
        }
        let (insn_a, insn_b) = (mth.insn(def_a), mth.insn(def_b));
        if insn_a.kind.is_const_load() && insn_b.kind.is_const_load() {
            return insn_a.const_literal().is_some()
                && insn_a.const_literal() == insn_b.const_literal();
        }
        self.same_insns_at(mth, def_a, def_b, depth + 1)
    }
}

/// Plain comparator used by the block matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSameInstructions;

impl SameInstructionsStrategy for DefaultSameInstructions {
    fn allow_definition_compare(&self, _mth: &MethodNode, _a: InsnId, _b: InsnId) -> bool {
        true
    }
}

/// Comparator aware of the two regions being matched. Renamed registers are only
/// followed to their definitions when both definitions sit inside their own
/// region, unless central definitions are currently allowed.
pub struct RegionSameInstructions<'a> {
    finally_region: &'a HashSet<NodeIndex>,
    candidate_region: &'a HashSet<NodeIndex>,
    allows_central: bool,
}

impl<'a> RegionSameInstructions<'a> {
    pub fn new(
        finally_region: &'a HashSet<NodeIndex>,
        candidate_region: &'a HashSet<NodeIndex>,
        allows_central: bool,
    ) -> Self {
        Self {
            finally_region,
            candidate_region,
            allows_central,
        }
    }

    fn defined_in(mth: &MethodNode, insn: InsnId, region: &HashSet<NodeIndex>) -> bool {
        mth.insn_block(insn).map_or(false, |b| region.contains(&b))
    }
}

impl SameInstructionsStrategy for RegionSameInstructions<'_> {
    fn allow_definition_compare(&self, mth: &MethodNode, finally_def: InsnId, candidate_def: InsnId) -> bool {
        if self.allows_central {
            return true;
        }
        Self::defined_in(mth, finally_def, self.finally_region)
            && Self::defined_in(mth, candidate_def, self.candidate_region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, MethodBuilder, RawArg};
    use petgraph::graph::NodeIndex;

    /// Two blocks each loading a constant and passing it to `use(I)`
    fn two_calls(first: i64, second: i64) -> (MethodNode, InsnId, InsnId) {
        let mut b = MethodBuilder::new("consts");
        let left = b.block();
        let right = b.block();
        let a = b.konst(left, 1, Literal::Int(first));
        b.invoke(left, "use(I)V", vec![RawArg::Var(a)]);
        let c = b.konst(right, 1, Literal::Int(second));
        b.invoke(right, "use(I)V", vec![RawArg::Var(c)]);
        b.ret(right);
        b.edge(left, right);
        let mth = b.load().unwrap();
        let call_a = mth.block_insns(NodeIndex::new(left))[1];
        let call_b = mth.block_insns(NodeIndex::new(right))[1];
        (mth, call_a, call_b)
    }

    #[test]
    fn test_renamed_registers_with_equal_constants_match() {
        let (mth, a, b) = two_calls(5, 5);
        assert!(DefaultSameInstructions.same_insns(&mth, a, b));
    }

    #[test]
    fn test_different_constants_do_not_match() {
        let (mth, a, b) = two_calls(5, 7);
        assert!(!DefaultSameInstructions.same_insns(&mth, a, b));
    }

    #[test]
    fn test_shared_code_var_matches() {
        let mut b = MethodBuilder::new("code_var");
        let blk = b.block();
        let x = b.var_with_code(2, 40);
        let y = b.var_with_code(3, 40);
        b.invoke(blk, "use(I)V", vec![RawArg::Var(x)]);
        b.invoke(blk, "use(I)V", vec![RawArg::Var(y)]);
        b.ret(blk);
        let mth = b.load().unwrap();
        let insns = mth.block_insns(NodeIndex::new(blk));
        assert!(DefaultSameInstructions.same_insns(&mth, insns[0], insns[1]));
    }

    #[test]
    fn test_region_strategy_rejects_outside_definitions() {
        let (mth, a, b) = two_calls(5, 5);
        let left: HashSet<NodeIndex> = [NodeIndex::new(0)].into_iter().collect();
        let empty = HashSet::new();
        let strict = RegionSameInstructions::new(&left, &empty, false);
        assert!(!strict.same_insns(&mth, a, b));
        let central = RegionSameInstructions::new(&left, &empty, true);
        assert!(central.same_insns(&mth, a, b));
    }
}
