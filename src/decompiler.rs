//! Main decompiler module
//!
//! Runs the pass pipeline over loaded methods and collects the extraction
//! report for each of them.

use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use crate::cfg::BlockAnalysisPass;
use crate::error::Result;
use crate::finally::MarkFinallyPass;
use crate::ir::{InsnId, MethodNode, RawMethod};
use crate::trycatch::{HandlerId, TryId};

pub const DEFAULT_EXPLORATION_LIMIT: usize = 10_000;

/// Decompilation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompileOptions {
    /// Run the finally extraction at all
    pub extract_finally: bool,
    /// Traversal steps allowed per try edge before giving up
    pub exploration_limit: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            extract_finally: true,
            exploration_limit: DEFAULT_EXPLORATION_LIMIT,
        }
    }
}

/// One step of the per-method pipeline
pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, mth: &mut MethodNode, options: &DecompileOptions) -> Result<()>;

    /// Whether a failure rebuilds the method instead of aborting it
    fn rollback_on_error(&self) -> bool {
        false
    }
}

/// Result of one try block that ended up with a finally clause
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FinallyReport {
    pub try_block: TryId,
    pub handler: HandlerId,
    /// Instructions of the canonical finally body
    pub canonical: Vec<InsnId>,
    /// Suppressed instructions outside the handler
    pub suppressed: Vec<InsnId>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MethodReport {
    pub name: String,
    pub finally_blocks: Vec<FinallyReport>,
    /// Blocks whose every instruction is suppressed
    pub suppressed_blocks: Vec<usize>,
    pub comments: Vec<String>,
    pub errors: Vec<String>,
}

impl MethodReport {
    pub fn from_method(mth: &MethodNode) -> Self {
        let mut handler_insns = std::collections::HashSet::new();
        for handler in mth.handlers().iter().filter(|h| h.removed) {
            for &block in &handler.blocks {
                handler_insns.extend(mth.block_insns(block).iter().copied());
            }
        }
        let mut finally_blocks = Vec::new();
        for handler in mth.handlers().iter().filter(|h| h.is_finally && !h.removed) {
            let mut canonical = Vec::new();
            for &block in &handler.blocks {
                for &id in mth.block_insns(block) {
                    handler_insns.insert(id);
                    if mth.insn(id).flags.finally {
                        canonical.push(id);
                    }
                }
            }
            finally_blocks.push(FinallyReport {
                try_block: handler.try_block,
                handler: handler.id,
                canonical,
                suppressed: Vec::new(),
            });
        }

        // Copies are attributed by location: inside the try region, or outside
        // every try block
        let suppressed: Vec<InsnId> = mth
            .graph()
            .node_indices()
            .flat_map(|block| mth.block_insns(block).iter().copied())
            .filter(|id| mth.insn(*id).is_suppressed() && !handler_insns.contains(id))
            .collect();
        if let [single] = finally_blocks.as_mut_slice() {
            single.suppressed = suppressed;
        } else {
            for report in &mut finally_blocks {
                report.suppressed = suppressed
                    .iter()
                    .copied()
                    .filter(|id| {
                        mth.insn_block(*id).map_or(false, |block| {
                            mth.try_block(report.try_block).contains_block(block)
                                || !mth.try_blocks().iter().any(|t| t.contains_block(block))
                        })
                    })
                    .collect();
            }
        }

        let suppressed_blocks = mth
            .graph()
            .node_indices()
            .filter(|block| mth.block(*block).flags.suppressed)
            .map(|block| block.index())
            .collect();

        MethodReport {
            name: mth.name().to_string(),
            finally_blocks,
            suppressed_blocks,
            comments: mth.comments().to_vec(),
            errors: mth.errors().to_vec(),
        }
    }

    /// Plain text rendering for the CLI
    pub fn to_text(&self) -> String {
        let mut out = format!("method {}\n", self.name);
        if self.finally_blocks.is_empty() {
            out.push_str("  no finally extracted\n");
        }
        for report in &self.finally_blocks {
            out.push_str(&format!(
                "  {} finally {}: {} canonical, {} suppressed\n",
                report.try_block,
                report.handler,
                report.canonical.len(),
                report.suppressed.len()
            ));
        }
        if !self.suppressed_blocks.is_empty() {
            let blocks: Vec<String> = self.suppressed_blocks.iter().map(|b| b.to_string()).collect();
            out.push_str(&format!("  suppressed blocks: {}\n", blocks.join(", ")));
        }
        for comment in &self.comments {
            out.push_str(&format!("  // {}\n", comment));
        }
        for error in &self.errors {
            out.push_str(&format!("  error: {}\n", error));
        }
        out
    }
}

/// Main decompiler struct
pub struct Decompiler {
    options: DecompileOptions,
    passes: Vec<Box<dyn Pass>>,
}

impl Decompiler {
    /// Create a decompiler with the default pipeline
    pub fn new(options: DecompileOptions) -> Self {
        Self::with_passes(
            options,
            vec![Box::new(BlockAnalysisPass), Box::new(MarkFinallyPass)],
        )
    }

    pub fn with_passes(options: DecompileOptions, passes: Vec<Box<dyn Pass>>) -> Self {
        Self { options, passes }
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Run every pass over a loaded method
    pub fn process_method(&self, mth: &mut MethodNode) -> Result<()> {
        for (idx, pass) in self.passes.iter().enumerate() {
            log::debug!("{}: running {}", mth.name(), pass.name());
            if let Err(err) = pass.run(mth, &self.options) {
                if !pass.rollback_on_error() {
                    return Err(err);
                }
                log::warn!("{}: {} failed, rolling back: {}", mth.name(), pass.name(), err);
                self.rollback(mth, idx)?;
                mth.add_error(format!("{} failed: {}", pass.name(), err));
            }
        }
        Ok(())
    }

    /// Rebuild the method and replay the passes before `failed`
    fn rollback(&self, mth: &mut MethodNode, failed: usize) -> Result<()> {
        mth.reload()?;
        for pass in &self.passes[..failed] {
            pass.run(mth, &self.options)?;
        }
        Ok(())
    }

    /// Load, process and report a single method
    pub fn decompile_method(&self, raw: Arc<RawMethod>) -> Result<MethodReport> {
        let mut mth = MethodNode::load(raw)?;
        self.process_method(&mut mth)?;
        Ok(MethodReport::from_method(&mth))
    }

    /// Methods are independent, so they are processed in parallel
    pub fn decompile_all(&self, methods: Vec<RawMethod>) -> Vec<Result<MethodReport>> {
        methods
            .into_par_iter()
            .map(|raw| self.decompile_method(Arc::new(raw)))
            .collect()
    }
}

impl Default for Decompiler {
    fn default() -> Self {
        Self::new(DecompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ir::MethodBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPass(AtomicUsize);

    impl Pass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, _mth: &mut MethodNode, _options: &DecompileOptions) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingPass {
        rollback: bool,
    }

    impl Pass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&self, mth: &mut MethodNode, _options: &DecompileOptions) -> Result<()> {
            let first = mth.block_insns(mth.entry())[0];
            mth.insn_mut(first).flags.suppress = true;
            Err(Error::internal("broken"))
        }

        fn rollback_on_error(&self) -> bool {
            self.rollback
        }
    }

    fn method() -> MethodNode {
        let mut b = MethodBuilder::new("m");
        let entry = b.block();
        b.invoke(entry, "a()V", vec![]);
        b.ret(entry);
        b.load().unwrap()
    }

    #[test]
    fn test_rollback_discards_partial_marks() {
        let counter = Arc::new(CountingPass(AtomicUsize::new(0)));
        struct Shared(Arc<CountingPass>);
        impl Pass for Shared {
            fn name(&self) -> &'static str {
                self.0.name()
            }
            fn run(&self, mth: &mut MethodNode, options: &DecompileOptions) -> Result<()> {
                self.0.run(mth, options)
            }
        }

        let decompiler = Decompiler::with_passes(
            DecompileOptions::default(),
            vec![
                Box::new(Shared(Arc::clone(&counter))),
                Box::new(FailingPass { rollback: true }),
            ],
        );
        let mut mth = method();
        decompiler.process_method(&mut mth).unwrap();

        let first = mth.block_insns(mth.entry())[0];
        assert!(!mth.insn(first).flags.suppress);
        assert_eq!(mth.errors().len(), 1);
        // Initial run plus the replay
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_without_rollback_propagates() {
        let decompiler = Decompiler::with_passes(
            DecompileOptions::default(),
            vec![Box::new(FailingPass { rollback: false })],
        );
        let mut mth = method();
        assert!(decompiler.process_method(&mut mth).is_err());
    }

    #[test]
    fn test_report_for_method_without_try() {
        let report = Decompiler::default()
            .decompile_method(Arc::new({
                let mut b = MethodBuilder::new("plain");
                let entry = b.block();
                b.ret(entry);
                b.build()
            }))
            .unwrap();
        assert_eq!(report.name, "plain");
        assert!(report.finally_blocks.is_empty());
        assert!(report.to_text().contains("no finally extracted"));
    }
}
