//! Command-line argument parsing for DocBuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// DocBuddy - grounded answers over your own documentation
#[derive(Parser, Debug)]
#[command(name = "docbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Ask questions about local documentation and get cited answers", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the commands that answer questions
#[derive(clap::Args, Debug, Clone)]
pub struct CorpusArgs {
    /// Documents or directories to ingest (added to the configured ones)
    #[arg(short, long = "docs", value_name = "PATH")]
    pub docs: Vec<PathBuf>,

    /// Planner and synthesizer implementation
    #[arg(long, value_enum, default_value_t = StepMode::Model)]
    pub mode: StepMode,

    /// Override the number of chunks retrieved per sub-question
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Override the critique threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// The question
        #[arg(value_name = "QUESTION")]
        question: String,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question session
    Chat {
        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Show how a document would be chunked
    Chunk {
        /// Document to split
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Display current configuration
    Config,
}

/// How the planner and synthesizer are implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StepMode {
    /// Language model planner and synthesizer
    Model,
    /// Clause splitting and extractive answers, no generation model needed
    Offline,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Check if should show informational output
    pub fn shows_info(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
