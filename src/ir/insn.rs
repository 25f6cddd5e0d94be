//! Instruction nodes
//!
//! An instruction has an operation kind, an optional payload (method, field or
//! type reference, operator, or the literal of a const-load), an optional result
//! register and an ordered argument list.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ssa::SsaVarId;

/// Stable index of an instruction in the method arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InsnId(pub u32);

impl InsnId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Operation kind of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsnKind {
    Const,
    Move,
    MoveException,
    Invoke,
    Arith,
    Compare,
    If,
    Goto,
    Return,
    Throw,
    MonitorEnter,
    MonitorExit,
    InstanceGet,
    InstancePut,
    StaticGet,
    StaticPut,
    NewInstance,
    CheckCast,
    ArrayGet,
    ArrayPut,
    Nop,
}

impl InsnKind {
    /// Instructions that only transfer control out of a path
    pub fn is_path_end(self) -> bool {
        matches!(self, InsnKind::Return | InsnKind::Throw | InsnKind::Goto)
    }

    pub fn is_const_load(self) -> bool {
        self == InsnKind::Const
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            InsnKind::Const => "const",
            InsnKind::Move => "move",
            InsnKind::MoveException => "move-exception",
            InsnKind::Invoke => "invoke",
            InsnKind::Arith => "arith",
            InsnKind::Compare => "cmp",
            InsnKind::If => "if",
            InsnKind::Goto => "goto",
            InsnKind::Return => "return",
            InsnKind::Throw => "throw",
            InsnKind::MonitorEnter => "monitor-enter",
            InsnKind::MonitorExit => "monitor-exit",
            InsnKind::InstanceGet => "iget",
            InsnKind::InstancePut => "iput",
            InsnKind::StaticGet => "sget",
            InsnKind::StaticPut => "sput",
            InsnKind::NewInstance => "new-instance",
            InsnKind::CheckCast => "check-cast",
            InsnKind::ArrayGet => "aget",
            InsnKind::ArrayPut => "aput",
            InsnKind::Nop => "nop",
        }
    }
}

/// Constant value carried by an argument or a const-load
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Str(String),
    Class(String),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Class(c) => write!(f, "{}.class", c),
            Literal::Null => write!(f, "null"),
        }
    }
}

/// Extra operand data that is part of the operation itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsnPayload {
    Method(String),
    Field(String),
    Type(String),
    Op(String),
    Literal(Literal),
}

impl fmt::Display for InsnPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsnPayload::Method(m) => write!(f, "{}", m),
            InsnPayload::Field(fld) => write!(f, "{}", fld),
            InsnPayload::Type(t) => write!(f, "{}", t),
            InsnPayload::Op(op) => write!(f, "{}", op),
            InsnPayload::Literal(lit) => write!(f, "{}", lit),
        }
    }
}

/// Register operand bound to an SSA variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegArg {
    pub reg: u16,
    pub var: SsaVarId,
}

impl fmt::Display for RegArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.reg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnArg {
    Register(RegArg),
    Literal(Literal),
    /// Nested instruction inlined as an argument
    Wrapped(InsnId),
}

impl InsnArg {
    pub fn as_register(&self) -> Option<&RegArg> {
        match self {
            InsnArg::Register(reg) => Some(reg),
            _ => None,
        }
    }
}

/// Output markers set by the finally extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsnFlags {
    /// Don't generate code for this instruction
    pub suppress: bool,
    /// Instruction belongs to the canonical finally body
    pub finally: bool,
}

#[derive(Debug, Clone)]
pub struct InsnNode {
    pub kind: InsnKind,
    pub payload: Option<InsnPayload>,
    pub result: Option<RegArg>,
    pub args: Vec<InsnArg>,
    pub flags: InsnFlags,
}

impl InsnNode {
    pub fn new(kind: InsnKind) -> Self {
        Self {
            kind,
            payload: None,
            result: None,
            args: Vec::new(),
            flags: InsnFlags::default(),
        }
    }

    /// Same operation: kind, payload and arity match. Arguments are not compared.
    pub fn is_same(&self, other: &InsnNode) -> bool {
        self.kind == other.kind
            && self.args.len() == other.args.len()
            && self.payload == other.payload
    }

    /// Literal loaded by a const instruction
    pub fn const_literal(&self) -> Option<&Literal> {
        if !self.kind.is_const_load() {
            return None;
        }
        match &self.payload {
            Some(InsnPayload::Literal(lit)) => Some(lit),
            _ => match self.args.first() {
                Some(InsnArg::Literal(lit)) => Some(lit),
                _ => None,
            },
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.flags.suppress
    }
}

impl fmt::Display for InsnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "{}", self.kind.mnemonic())?;
        if let Some(payload) = &self.payload {
            write!(f, " {}", payload)?;
        }
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|arg| match arg {
                    InsnArg::Register(reg) => reg.to_string(),
                    InsnArg::Literal(lit) => lit.to_string(),
                    InsnArg::Wrapped(id) => format!("<{}>", id),
                })
                .collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(method: &str, args: Vec<InsnArg>) -> InsnNode {
        let mut insn = InsnNode::new(InsnKind::Invoke);
        insn.payload = Some(InsnPayload::Method(method.to_string()));
        insn.args = args;
        insn
    }

    #[test]
    fn test_is_same_requires_payload_and_arity() {
        let a = invoke("close()", vec![]);
        let b = invoke("close()", vec![]);
        let c = invoke("open()", vec![]);
        let d = invoke("close()", vec![InsnArg::Literal(Literal::Int(1))]);
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
        assert!(!a.is_same(&d));
    }

    #[test]
    fn test_const_literal() {
        let mut insn = InsnNode::new(InsnKind::Const);
        insn.payload = Some(InsnPayload::Literal(Literal::Int(7)));
        assert_eq!(insn.const_literal(), Some(&Literal::Int(7)));
        assert_eq!(invoke("f()", vec![]).const_literal(), None);
    }

    #[test]
    fn test_display() {
        let mut insn = invoke("log(I)", vec![InsnArg::Literal(Literal::Int(3))]);
        insn.result = Some(RegArg {
            reg: 2,
            var: SsaVarId(0),
        });
        assert_eq!(insn.to_string(), "r2 = invoke log(I)(3)");
    }
}
