//! Instruction and method model
//!
//! Instructions live in a per-method arena and are addressed by [`InsnId`].
//! Blocks, slices and try/catch bookkeeping only ever hold ids, never copies.

pub mod builder;
pub mod insn;
pub mod method;
pub mod raw;
pub mod ssa;

pub use builder::MethodBuilder;
pub use insn::{InsnArg, InsnFlags, InsnId, InsnKind, InsnNode, InsnPayload, Literal, RegArg};
pub use method::MethodNode;
pub use raw::{RawArg, RawBlock, RawHandler, RawInsn, RawMethod, RawTryBlock, RawVar};
pub use ssa::{CodeVarId, DebugInfo, SsaVar, SsaVarId};
