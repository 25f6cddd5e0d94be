//! Writing an extraction result back into the method

use petgraph::graph::NodeIndex;
use std::collections::BTreeSet;

use super::session::{FinallyBody, FinallyExtractInfo};
use crate::error::{Error, Result};
use crate::ir::{InsnArg, InsnId, MethodNode};
use crate::trycatch::{active_inner_tries, own_handlers, TryId};

/// Mark the canonical body, suppress every duplicate and the rethrow, and
/// flag the handler as the finally clause
pub fn apply_finally(mth: &mut MethodNode, info: &FinallyExtractInfo, merge_inner: bool) -> Result<()> {
    let canonical: Vec<InsnId> = info.finally_slice().insns().collect();
    for &id in &canonical {
        mth.insn_mut(id).flags.finally = true;
    }

    let mut touched: BTreeSet<NodeIndex> = BTreeSet::new();
    for dup in info.duplicate_slices() {
        for (&from, to) in canonical.iter().zip(dup.insns()) {
            copy_code_vars(mth, from, to)?;
            mth.insn_mut(to).flags.suppress = true;
        }
        touched.extend(dup.blocks());
    }
    for &rethrow in &info.body.rethrows {
        mth.insn_mut(rethrow).flags.suppress = true;
    }

    for block in touched {
        let suppressed = mth
            .block_insns(block)
            .iter()
            .all(|id| mth.insn(*id).is_suppressed());
        mth.block_mut(block).flags.suppressed = suppressed;
    }
    for &block in &info.body.handler_blocks {
        let finally = mth.block_insns(block).iter().all(|id| {
            mth.insn(*id).flags.finally || info.body.excluded.contains(id)
        });
        mth.block_mut(block).flags.finally = finally;
    }

    mth.handler_mut(info.handler()).is_finally = true;
    if merge_inner {
        merge_inner_tries(mth, info.try_id);
    }
    Ok(())
}

/// Make the duplicate's variables render as the canonical ones, descending
/// into wrapped instructions
pub fn copy_code_vars(mth: &mut MethodNode, from: InsnId, to: InsnId) -> Result<()> {
    let source = mth.insn(from).clone();
    let target = mth.insn(to).clone();
    if source.args.len() != target.args.len() {
        return Err(Error::internal(format!(
            "{}: cannot copy variables from {} to {}, argument counts differ",
            mth.name(),
            from,
            to
        )));
    }

    if let (Some(src), Some(dst)) = (source.result, target.result) {
        let code_var = mth.var(src.var).code_var;
        mth.var_mut(dst.var).code_var = code_var;
    }
    for (src, dst) in source.args.iter().zip(&target.args) {
        match (src, dst) {
            (InsnArg::Register(a), InsnArg::Register(b)) => {
                let code_var = mth.var(a.var).code_var;
                mth.var_mut(b.var).code_var = code_var;
            }
            (InsnArg::Wrapped(a), InsnArg::Wrapped(b)) => copy_code_vars(mth, *a, *b)?,
            _ => {}
        }
    }
    Ok(())
}

/// Fold the live inner try blocks into `try_id`
pub fn merge_inner_tries(mth: &mut MethodNode, try_id: TryId) {
    let inner = active_inner_tries(mth, try_id);
    for &inner_id in &inner {
        let (blocks, handlers) = {
            let inner_try = mth.try_block(inner_id);
            (inner_try.blocks.clone(), inner_try.handlers.clone())
        };
        let outer = mth.try_block_mut(try_id);
        for block in blocks {
            if !outer.blocks.contains(&block) {
                outer.blocks.push(block);
            }
        }
        for handler in handlers {
            if !outer.handlers.contains(&handler) {
                outer.handlers.push(handler);
            }
        }
        mth.try_block_mut(inner_id).merged = true;
        log::debug!("{}: merged {} into {}", mth.name(), inner_id, try_id);
    }
    mth.try_block_mut(try_id).inner.retain(|id| !inner.contains(id));
}

/// Drop a catch-all handler that only rethrows. The try block becomes
/// implicit once no live handler is left.
pub fn remove_handler(mth: &mut MethodNode, body: &FinallyBody) {
    let handler = mth.handler_mut(body.handler);
    handler.removed = true;
    let try_id = handler.try_block;

    for &id in &body.excluded {
        mth.insn_mut(id).flags.suppress = true;
    }
    for &block in &body.handler_blocks {
        let suppressed = mth
            .block_insns(block)
            .iter()
            .all(|id| mth.insn(*id).is_suppressed());
        mth.block_mut(block).flags.suppressed = suppressed;
    }
    if own_handlers(mth, try_id).is_empty() {
        mth.try_block_mut(try_id).implicit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::invoke_insn;
    use crate::ir::{MethodBuilder, RawArg};

    #[test]
    fn test_copy_code_vars_into_wrapped_args() {
        let mut b = MethodBuilder::new("wrapped");
        let block = b.block();
        let a = b.var(0);
        let c = b.var(0);
        b.push(
            block,
            invoke_insn("f(I)V", vec![RawArg::Insn(Box::new(invoke_insn("g(I)I", vec![RawArg::Var(a)], None)))], None),
        );
        b.push(
            block,
            invoke_insn("f(I)V", vec![RawArg::Insn(Box::new(invoke_insn("g(I)I", vec![RawArg::Var(c)], None)))], None),
        );
        b.ret(block);
        let mut mth = b.load().unwrap();
        let insns = mth.block_insns(NodeIndex::new(block)).to_vec();

        copy_code_vars(&mut mth, insns[0], insns[1]).unwrap();
        assert_eq!(
            mth.var(crate::ir::SsaVarId(a)).code_var,
            mth.var(crate::ir::SsaVarId(c)).code_var
        );
    }

    #[test]
    fn test_copy_code_vars_rejects_arity_mismatch() {
        let mut b = MethodBuilder::new("arity");
        let block = b.block();
        let a = b.var(0);
        b.push(block, invoke_insn("f(I)V", vec![RawArg::Var(a)], None));
        b.push(block, invoke_insn("f()V", vec![], None));
        b.ret(block);
        let mut mth = b.load().unwrap();
        let insns = mth.block_insns(NodeIndex::new(block)).to_vec();
        assert!(copy_code_vars(&mut mth, insns[0], insns[1]).is_err());
    }
}
