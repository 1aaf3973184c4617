//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - list: show the diagnostic catalog
//! - run: run diagnostics, chaining repairs
//! - exec: run one command through the process runner

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Healthcheck - runs Windows maintenance tools and chains repairs
#[derive(Parser, Debug)]
#[command(name = "healthcheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the available diagnostics
    List,

    /// Run diagnostics in order, offering repairs when problems are found
    Run {
        /// Diagnostic ids (see `list`)
        #[arg(required = true)]
        ids: Vec<String>,

        /// Accept every repair without asking
        #[arg(short, long, conflicts_with = "no")]
        yes: bool,

        /// Decline every repair without asking
        #[arg(short, long)]
        no: bool,

        /// Write a text report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one command and stream its output
    Exec {
        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Output is UTF-16LE
        #[arg(short, long)]
        wide: bool,

        /// Split into arguments instead of going through the shell
        #[arg(short, long)]
        argv: bool,
    },
}
