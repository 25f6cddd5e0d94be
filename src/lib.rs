//! finally-dec-rs: duplicate finally-block detection for bytecode decompilation
//!
//! Compiled `try`/`finally` leaves one copy of the finally clause on every way
//! out of the try block. This library finds those copies in a method's control
//! flow graph, keeps the catch-all handler's body as the canonical clause and
//! marks every copy as suppressed, so a code generator can print the source
//! form again.

pub mod cfg;
pub mod cli;
pub mod decompiler;
pub mod error;
pub mod finally;
pub mod ir;
pub mod trycatch;

pub use decompiler::{DecompileOptions, Decompiler, MethodReport};
pub use error::{Error, Result};
pub use error::{Error as DecompilerError, Result as DecompilerResult};

// Re-export commonly used types
pub use cfg::{Block, EdgeKind};
pub use ir::{MethodBuilder, MethodNode, RawMethod};
