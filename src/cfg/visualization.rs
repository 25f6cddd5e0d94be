//! CFG visualization module
//!
//! DOT output for a method graph, annotated with extraction markers.

use petgraph::visit::EdgeRef;

use crate::cfg::EdgeKind;
use crate::ir::MethodNode;

/// DOT generation options
#[derive(Debug, Clone)]
pub struct DotOptions {
    /// Include edge labels
    pub include_labels: bool,
    /// Include edge colors
    pub include_colors: bool,
    /// List instructions inside each node
    pub include_instructions: bool,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            include_labels: true,
            include_colors: true,
            include_instructions: true,
        }
    }
}

/// Generate DOT representation of a method CFG
pub fn generate_dot(mth: &MethodNode, options: &DotOptions) -> String {
    let graph = mth.graph();
    let mut dot = String::new();
    dot.push_str("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, fontname=\"monospace\"];\n\n");

    for node in graph.node_indices() {
        let label = format_block_label(mth, node, options);
        let block = mth.block(node);
        let style = if block.flags.suppressed {
            ", style=dashed"
        } else if block.flags.finally {
            ", style=bold"
        } else {
            ""
        };
        dot.push_str(&format!("  {} [label=\"{}\"{}];\n", node.index(), label, style));
    }

    dot.push('\n');

    for edge in graph.edge_references() {
        let mut edge_str = format!("  {} -> {}", edge.source().index(), edge.target().index());
        let mut attributes = Vec::new();

        if options.include_labels {
            if let Some(label) = get_edge_label(mth, edge.source(), edge.target(), *edge.weight()) {
                attributes.push(format!("label=\"{}\"", label));
            }
        }
        if options.include_colors {
            attributes.push(format!("color=\"{}\"", get_edge_color(*edge.weight())));
        }
        if !attributes.is_empty() {
            edge_str.push_str(&format!(" [{}]", attributes.join(", ")));
        }

        edge_str.push_str(";\n");
        dot.push_str(&edge_str);
    }

    dot.push_str("}\n");
    dot
}

/// Format a block label for DOT
fn format_block_label(mth: &MethodNode, node: petgraph::graph::NodeIndex, options: &DotOptions) -> String {
    let block = mth.block(node);
    if block.is_exit() {
        return "EXIT".to_string();
    }
    let mut label = format!("Block {}", node.index());
    if options.include_instructions {
        for &id in block.instructions() {
            let insn = mth.insn(id);
            let marker = if insn.flags.suppress {
                "// "
            } else if insn.flags.finally {
                "F "
            } else {
                ""
            };
            label.push_str(&format!("\\l{}{}", marker, insn).replace('"', "\\\""));
        }
        label.push_str("\\l");
    }
    label
}

/// Get edge label for DOT
fn get_edge_label(
    mth: &MethodNode,
    source: petgraph::graph::NodeIndex,
    target: petgraph::graph::NodeIndex,
    kind: EdgeKind,
) -> Option<String> {
    match kind {
        EdgeKind::Exception => Some("Exc".to_string()),
        EdgeKind::Normal if mth.is_back_edge(source, target) => Some("Back".to_string()),
        EdgeKind::Normal => None,
    }
}

/// Get edge color for DOT
fn get_edge_color(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Exception => "purple",
        EdgeKind::Normal => "black",
    }
}
