//! Method node
//!
//! Owns the CFG, the instruction arena, SSA variables and try/catch bookkeeping of
//! one method. Analysis results (dominators, post-dominators, back edges) are filled
//! in by the block analysis pass.

use petgraph::algo::dominators::Dominators;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashSet;
use std::sync::Arc;

use super::insn::{InsnArg, InsnId, InsnNode, RegArg};
use super::raw::{RawArg, RawInsn, RawMethod};
use super::ssa::{CodeVarId, DebugInfo, SsaVar, SsaVarId};
use crate::cfg::{Block, EdgeKind};
use crate::error::{Error, Result};
use crate::trycatch::{ExceptionHandler, HandlerId, TryCatchBlock, TryId};

#[derive(Debug, Clone)]
pub struct MethodNode {
    source: Arc<RawMethod>,
    name: String,
    graph: DiGraph<Block, EdgeKind>,
    insns: Vec<InsnNode>,
    insn_blocks: Vec<Option<NodeIndex>>,
    vars: Vec<SsaVar>,
    entry: NodeIndex,
    exit: NodeIndex,
    try_blocks: Vec<TryCatchBlock>,
    handlers: Vec<ExceptionHandler>,
    active_tries: Vec<TryId>,
    back_edges: HashSet<(NodeIndex, NodeIndex)>,
    dominators: Option<Dominators<NodeIndex>>,
    post_dominators: Option<Dominators<NodeIndex>>,
    comments: Vec<String>,
    errors: Vec<String>,
}

impl MethodNode {
    /// Build a method from its serialized form
    pub fn load(source: Arc<RawMethod>) -> Result<Self> {
        if source.blocks.is_empty() {
            return Err(Error::invalid_method(&source.name, "method has no blocks"));
        }

        let mut mth = MethodNode {
            name: source.name.clone(),
            graph: DiGraph::new(),
            insns: Vec::new(),
            insn_blocks: Vec::new(),
            vars: Vec::new(),
            entry: NodeIndex::new(0),
            exit: NodeIndex::new(0),
            try_blocks: Vec::new(),
            handlers: Vec::new(),
            active_tries: Vec::new(),
            back_edges: HashSet::new(),
            dominators: None,
            post_dominators: None,
            comments: Vec::new(),
            errors: Vec::new(),
            source,
        };
        let source = Arc::clone(&mth.source);

        mth.load_vars(&source);

        let nodes: Vec<NodeIndex> = source
            .blocks
            .iter()
            .map(|_| mth.graph.add_node(Block::new()))
            .collect();
        mth.entry = nodes[0];
        mth.exit = mth.graph.add_node(Block::exit());

        for (raw_block, &node) in source.blocks.iter().zip(&nodes) {
            for raw_insn in &raw_block.insns {
                let id = mth.load_insn(raw_insn, Some(node))?;
                mth.graph[node].insns.push(id);
            }
            for &succ in &raw_block.succ {
                let target = mth.block_at(&nodes, succ)?;
                mth.connect(node, target, EdgeKind::Normal);
            }
        }

        mth.load_try_blocks(&source, &nodes)?;

        // Every block without a normal successor flows into the synthetic exit
        for &node in &nodes {
            let has_normal = mth
                .graph
                .edges_directed(node, Direction::Outgoing)
                .any(|e| *e.weight() == EdgeKind::Normal);
            if !has_normal {
                mth.connect(node, mth.exit, EdgeKind::Normal);
            }
        }

        Ok(mth)
    }

    /// Discard every change and rebuild the method from its raw input
    pub fn reload(&mut self) -> Result<()> {
        let fresh = Self::load(Arc::clone(&self.source))?;
        *self = fresh;
        Ok(())
    }

    fn load_vars(&mut self, source: &RawMethod) {
        let implicit_base = source
            .vars
            .iter()
            .filter_map(|v| v.code_var)
            .max()
            .map_or(0, |max| max + 1);
        self.vars = source
            .vars
            .iter()
            .enumerate()
            .map(|(idx, raw)| SsaVar {
                reg: raw.reg,
                version: raw.version,
                debug_info: raw.name.as_ref().map(|name| DebugInfo {
                    name: name.clone(),
                    ty: raw.ty.clone(),
                }),
                def: None,
                code_var: CodeVarId(raw.code_var.unwrap_or(implicit_base + idx as u32)),
            })
            .collect();
    }

    fn load_insn(&mut self, raw: &RawInsn, block: Option<NodeIndex>) -> Result<InsnId> {
        let mut args = Vec::with_capacity(raw.args.len());
        for arg in &raw.args {
            args.push(match arg {
                RawArg::Var(var) => InsnArg::Register(self.reg_arg(*var)?),
                RawArg::Lit(lit) => InsnArg::Literal(lit.clone()),
                RawArg::Insn(nested) => InsnArg::Wrapped(self.load_insn(nested, None)?),
            });
        }
        let result = raw.result.map(|var| self.reg_arg(var)).transpose()?;

        let id = InsnId(self.insns.len() as u32);
        let mut insn = InsnNode::new(raw.op);
        insn.payload = raw.payload.clone();
        insn.result = result;
        insn.args = args;
        self.insns.push(insn);
        self.insn_blocks.push(block);

        if let Some(result) = result {
            let var = &mut self.vars[result.var.index()];
            if var.def.is_some() {
                return Err(Error::invalid_method(
                    &self.name,
                    format!("variable {} is assigned more than once", result.var.0),
                ));
            }
            var.def = Some(id);
        }
        Ok(id)
    }

    fn reg_arg(&self, var: u32) -> Result<RegArg> {
        let ssa = self.vars.get(var as usize).ok_or_else(|| {
            Error::invalid_method(&self.name, format!("unknown variable {}", var))
        })?;
        Ok(RegArg {
            reg: ssa.reg,
            var: SsaVarId(var),
        })
    }

    fn block_at(&self, nodes: &[NodeIndex], idx: usize) -> Result<NodeIndex> {
        nodes
            .get(idx)
            .copied()
            .ok_or_else(|| Error::invalid_method(&self.name, format!("unknown block {}", idx)))
    }

    fn load_try_blocks(&mut self, source: &RawMethod, nodes: &[NodeIndex]) -> Result<()> {
        for (idx, raw_try) in source.try_blocks.iter().enumerate() {
            let try_id = TryId(idx);
            let blocks = raw_try
                .blocks
                .iter()
                .map(|b| self.block_at(nodes, *b))
                .collect::<Result<Vec<_>>>()?;

            let mut handler_ids = Vec::new();
            for raw_handler in &raw_try.handlers {
                let entry = self.block_at(nodes, raw_handler.block)?;
                let id = HandlerId(self.handlers.len());
                self.handlers.push(ExceptionHandler {
                    id,
                    entry,
                    catch_types: raw_handler.catch_types.clone(),
                    try_block: try_id,
                    blocks: Vec::new(),
                    is_finally: false,
                    removed: false,
                });
                handler_ids.push(id);
                for &block in &blocks {
                    self.connect(block, entry, EdgeKind::Exception);
                }
            }

            let outer = match raw_try.outer {
                Some(outer) if outer >= source.try_blocks.len() || outer == idx => {
                    return Err(Error::invalid_method(
                        &self.name,
                        format!("try block {} has invalid outer try {}", idx, outer),
                    ));
                }
                other => other.map(TryId),
            };

            self.try_blocks.push(TryCatchBlock {
                id: try_id,
                blocks,
                handlers: handler_ids,
                inner: Vec::new(),
                outer,
                merged: false,
                implicit: false,
            });
            self.active_tries.push(try_id);
        }

        for idx in 0..self.try_blocks.len() {
            let mut current = self.try_blocks[idx].outer;
            let mut depth = 0;
            while let Some(outer) = current {
                depth += 1;
                if depth > self.try_blocks.len() {
                    return Err(Error::invalid_method(
                        &self.name,
                        format!("try block {} has a cyclic outer chain", idx),
                    ));
                }
                current = self.try_blocks[outer.0].outer;
            }
        }

        for idx in 0..self.try_blocks.len() {
            if let Some(outer) = self.try_blocks[idx].outer {
                self.try_blocks[outer.0].inner.push(TryId(idx));
            }
        }
        Ok(())
    }

    fn connect(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == kind);
        if !exists {
            self.graph.add_edge(from, to, kind);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &RawMethod {
        &self.source
    }

    pub fn graph(&self) -> &DiGraph<Block, EdgeKind> {
        &self.graph
    }

    pub fn entry(&self) -> NodeIndex {
        self.entry
    }

    /// Synthetic exit block
    pub fn exit(&self) -> NodeIndex {
        self.exit
    }

    pub fn block(&self, block: NodeIndex) -> &Block {
        &self.graph[block]
    }

    pub fn block_mut(&mut self, block: NodeIndex) -> &mut Block {
        &mut self.graph[block]
    }

    pub fn block_insns(&self, block: NodeIndex) -> &[InsnId] {
        &self.graph[block].insns
    }

    pub fn insn(&self, id: InsnId) -> &InsnNode {
        &self.insns[id.index()]
    }

    pub fn insn_mut(&mut self, id: InsnId) -> &mut InsnNode {
        &mut self.insns[id.index()]
    }

    pub fn insn_count(&self) -> usize {
        self.insns.len()
    }

    /// Block owning an instruction; wrapped instructions have none
    pub fn insn_block(&self, id: InsnId) -> Option<NodeIndex> {
        self.insn_blocks.get(id.index()).copied().flatten()
    }

    pub fn var(&self, id: SsaVarId) -> &SsaVar {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: SsaVarId) -> &mut SsaVar {
        &mut self.vars[id.index()]
    }

    pub fn try_blocks(&self) -> &[TryCatchBlock] {
        &self.try_blocks
    }

    pub fn try_block(&self, id: TryId) -> &TryCatchBlock {
        &self.try_blocks[id.0]
    }

    pub fn try_block_mut(&mut self, id: TryId) -> &mut TryCatchBlock {
        &mut self.try_blocks[id.0]
    }

    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    pub fn handler(&self, id: HandlerId) -> &ExceptionHandler {
        &self.handlers[id.0]
    }

    pub fn handler_mut(&mut self, id: HandlerId) -> &mut ExceptionHandler {
        &mut self.handlers[id.0]
    }

    /// Try blocks still taking part in region building
    pub fn active_try_blocks(&self) -> &[TryId] {
        &self.active_tries
    }

    pub fn retain_active_try_blocks(&mut self, mut keep: impl FnMut(&TryCatchBlock) -> bool) {
        let try_blocks = &self.try_blocks;
        self.active_tries.retain(|id| keep(&try_blocks[id.0]));
    }

    pub fn is_back_edge(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.back_edges.contains(&(from, to))
    }

    pub fn set_back_edges(&mut self, back_edges: HashSet<(NodeIndex, NodeIndex)>) {
        self.back_edges = back_edges;
    }

    pub fn dominators(&self) -> Result<&Dominators<NodeIndex>> {
        self.dominators
            .as_ref()
            .ok_or_else(|| Error::internal(format!("dominators not computed for {}", self.name)))
    }

    pub fn post_dominators(&self) -> Result<&Dominators<NodeIndex>> {
        self.post_dominators.as_ref().ok_or_else(|| {
            Error::internal(format!("post-dominators not computed for {}", self.name))
        })
    }

    pub fn set_dominators(&mut self, dominators: Dominators<NodeIndex>) {
        self.dominators = Some(dominators);
    }

    pub fn set_post_dominators(&mut self, post_dominators: Dominators<NodeIndex>) {
        self.post_dominators = Some(post_dominators);
    }

    /// Attach a human-readable diagnostic for a soft failure
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        if !self.comments.contains(&comment) {
            self.comments.push(comment);
        }
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}
