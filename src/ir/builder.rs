//! Programmatic construction of raw methods
//!
//! Used by tests, benchmarks and tooling that need small methods without writing
//! JSON by hand. Blocks and variables are plain indices into the raw method.

use std::sync::Arc;

use super::insn::{InsnKind, InsnPayload, Literal};
use super::method::MethodNode;
use super::raw::{RawArg, RawBlock, RawHandler, RawInsn, RawMethod, RawTryBlock, RawVar};
use crate::error::Result;

pub struct MethodBuilder {
    method: RawMethod,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            method: RawMethod {
                name: name.into(),
                vars: Vec::new(),
                blocks: Vec::new(),
                try_blocks: Vec::new(),
            },
        }
    }

    pub fn block(&mut self) -> usize {
        self.method.blocks.push(RawBlock::default());
        self.method.blocks.len() - 1
    }

    /// New SSA variable on a register
    pub fn var(&mut self, reg: u16) -> u32 {
        self.push_var(RawVar {
            reg,
            version: 0,
            name: None,
            ty: None,
            code_var: None,
        })
    }

    /// New SSA variable carrying debug info
    pub fn named_var(&mut self, reg: u16, name: &str, ty: &str) -> u32 {
        self.push_var(RawVar {
            reg,
            version: 0,
            name: Some(name.to_string()),
            ty: Some(ty.to_string()),
            code_var: None,
        })
    }

    /// New SSA variable sharing an explicit code variable
    pub fn var_with_code(&mut self, reg: u16, code_var: u32) -> u32 {
        self.push_var(RawVar {
            reg,
            version: 0,
            name: None,
            ty: None,
            code_var: Some(code_var),
        })
    }

    fn push_var(&mut self, mut var: RawVar) -> u32 {
        var.version = self
            .method
            .vars
            .iter()
            .filter(|v| v.reg == var.reg)
            .count() as u32;
        self.method.vars.push(var);
        (self.method.vars.len() - 1) as u32
    }

    pub fn edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.method.blocks[from].succ.push(to);
        self
    }

    pub fn push(&mut self, block: usize, insn: RawInsn) -> &mut Self {
        self.method.blocks[block].insns.push(insn);
        self
    }

    pub fn invoke(&mut self, block: usize, method: &str, args: Vec<RawArg>) -> &mut Self {
        self.push(block, invoke_insn(method, args, None))
    }

    /// Invoke whose result lands in a fresh variable on `reg`
    pub fn invoke_result(&mut self, block: usize, reg: u16, method: &str, args: Vec<RawArg>) -> u32 {
        let var = self.var(reg);
        self.push(block, invoke_insn(method, args, Some(var)));
        var
    }

    pub fn konst(&mut self, block: usize, reg: u16, lit: Literal) -> u32 {
        let var = self.var(reg);
        self.push(
            block,
            RawInsn {
                op: InsnKind::Const,
                payload: Some(InsnPayload::Literal(lit)),
                result: Some(var),
                args: Vec::new(),
            },
        );
        var
    }

    pub fn move_exception(&mut self, block: usize, reg: u16) -> u32 {
        let var = self.var(reg);
        self.push(
            block,
            RawInsn {
                op: InsnKind::MoveException,
                payload: None,
                result: Some(var),
                args: Vec::new(),
            },
        );
        var
    }

    pub fn throw(&mut self, block: usize, var: u32) -> &mut Self {
        self.push(block, simple_insn(InsnKind::Throw, vec![RawArg::Var(var)]))
    }

    pub fn ret(&mut self, block: usize) -> &mut Self {
        self.push(block, simple_insn(InsnKind::Return, Vec::new()))
    }

    pub fn ret_value(&mut self, block: usize, var: u32) -> &mut Self {
        self.push(block, simple_insn(InsnKind::Return, vec![RawArg::Var(var)]))
    }

    pub fn if_test(&mut self, block: usize, var: u32) -> &mut Self {
        self.push(block, simple_insn(InsnKind::If, vec![RawArg::Var(var)]))
    }

    pub fn goto(&mut self, block: usize) -> &mut Self {
        self.push(block, simple_insn(InsnKind::Goto, Vec::new()))
    }

    /// Try block over `blocks` with `(handler block, catch types)` handlers.
    /// An empty catch type list makes a catch-all handler.
    pub fn try_block(&mut self, blocks: &[usize], handlers: &[(usize, &[&str])]) -> usize {
        self.method.try_blocks.push(RawTryBlock {
            blocks: blocks.to_vec(),
            handlers: handlers
                .iter()
                .map(|(block, types)| RawHandler {
                    block: *block,
                    catch_types: types.iter().map(|t| t.to_string()).collect(),
                })
                .collect(),
            outer: None,
        });
        self.method.try_blocks.len() - 1
    }

    pub fn nest(&mut self, inner: usize, outer: usize) -> &mut Self {
        self.method.try_blocks[inner].outer = Some(outer);
        self
    }

    pub fn build(self) -> RawMethod {
        self.method
    }

    pub fn load(self) -> Result<MethodNode> {
        MethodNode::load(Arc::new(self.method))
    }
}

pub fn invoke_insn(method: &str, args: Vec<RawArg>, result: Option<u32>) -> RawInsn {
    RawInsn {
        op: InsnKind::Invoke,
        payload: Some(InsnPayload::Method(method.to_string())),
        result,
        args,
    }
}

pub fn simple_insn(op: InsnKind, args: Vec<RawArg>) -> RawInsn {
    RawInsn {
        op,
        payload: None,
        result: None,
        args,
    }
}
