//! Command-line interface module
//!
//! This module contains the implementations for the CLI subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::decompiler::{DecompileOptions, DEFAULT_EXPLORATION_LIMIT};

pub mod cfg;
pub mod extract;

#[derive(Parser)]
#[command(name = "finally-dec-rs")]
#[command(about = "Detect and extract duplicated finally blocks in decompiled methods")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run finally extraction and print the per-method report
    Extract {
        /// Input method file (JSON, one method or an array)
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Skip finally extraction
        #[arg(long)]
        no_finally: bool,

        /// Traversal steps allowed per try edge
        #[arg(long, default_value_t = DEFAULT_EXPLORATION_LIMIT)]
        exploration_limit: usize,
    },

    /// Build and analyze control flow graphs
    Cfg {
        /// Input method file
        input: PathBuf,
        /// Output DOT file for visualization (optional)
        #[arg(short, long)]
        dot: Option<PathBuf>,
    },
}

/// Arguments for the extract command
#[derive(Debug, Clone)]
pub struct ExtractArgs {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub format: OutputFormat,
    pub no_finally: bool,
    pub exploration_limit: usize,
}

impl ExtractArgs {
    /// Convert to DecompileOptions
    pub fn to_options(&self) -> DecompileOptions {
        DecompileOptions {
            extract_finally: !self.no_finally,
            exploration_limit: self.exploration_limit,
        }
    }
}

/// Common CLI utilities
pub mod utils {
    use super::*;
    use crate::error::{Error as DecompilerError, Result as DecompilerResult};

    /// Read a text file
    pub fn read_file(path: &Path) -> DecompilerResult<String> {
        std::fs::read_to_string(path).map_err(|e| {
            DecompilerError::Io(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    /// Write output to file or stdout
    pub fn write_output(content: &str, output_path: Option<&Path>) -> DecompilerResult<()> {
        match output_path {
            Some(path) => std::fs::write(path, content).map_err(|e| {
                DecompilerError::Io(format!("Failed to write {}: {}", path.display(), e))
            }),
            None => {
                println!("{}", content);
                Ok(())
            }
        }
    }
}
