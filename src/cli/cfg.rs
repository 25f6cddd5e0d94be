use std::path::Path;
use std::sync::Arc;

use super::utils::read_file;
use crate::cfg::visualization::{generate_dot, DotOptions};
use crate::cfg::BlockAnalysisPass;
use crate::decompiler::{DecompileOptions, Pass};
use crate::error::{Error as DecompilerError, Result as DecompilerResult};
use crate::ir::{MethodNode, RawMethod};

/// Build and analyze control flow graphs for every method in the input
pub fn cfg(input_path: &Path, output_dot: Option<&Path>) -> DecompilerResult<()> {
    let text = read_file(input_path)?;
    let methods = RawMethod::list_from_json(&text)?;
    println!("Method count: {}", methods.len());

    let options = DecompileOptions::default();
    let mut dot_content = String::new();
    for raw in methods {
        let mut mth = MethodNode::load(Arc::new(raw))?;
        BlockAnalysisPass.run(&mut mth, &options)?;
        print_summary(&mth);
        if output_dot.is_some() {
            dot_content.push_str(&format!("// {}\n", mth.name()));
            dot_content.push_str(&generate_dot(&mth, &DotOptions::default()));
        }
    }

    if let Some(dot_path) = output_dot {
        std::fs::write(dot_path, dot_content)
            .map_err(|e| DecompilerError::Io(format!("Failed to write DOT file: {}", e)))?;
        println!("DOT exported to: {}", dot_path.display());
    }
    Ok(())
}

fn print_summary(mth: &MethodNode) {
    let graph = mth.graph();
    println!("Method {}:", mth.name());
    // The synthetic exit is not a real block
    println!("  Basic blocks: {}", graph.node_count() - 1);
    println!("  Edges: {}", graph.edge_count());

    let loop_ends: Vec<String> = graph
        .node_indices()
        .filter(|b| mth.block(*b).flags.loop_end)
        .map(|b| b.index().to_string())
        .collect();
    if !loop_ends.is_empty() {
        println!("  Loop ends: {}", loop_ends.join(", "));
    }

    for try_block in mth.try_blocks() {
        println!(
            "  {}: {} block(s), {} handler(s)",
            try_block.id,
            try_block.blocks.len(),
            try_block.handlers.len()
        );
        for &handler in &try_block.handlers {
            let handler = mth.handler(handler);
            let kind = if handler.is_catch_all() {
                "catch-all".to_string()
            } else {
                handler.catch_types.join(" | ")
            };
            println!(
                "    {} ({}): entry {}, {} block(s)",
                handler.id,
                kind,
                handler.entry.index(),
                handler.blocks.len()
            );
        }
    }
}
