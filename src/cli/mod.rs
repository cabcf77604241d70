//! CLI module for DocBuddy
//!
//! Handles command-line argument parsing and configuration management.

pub mod args;
pub mod config;

pub use args::{Args, Commands, CorpusArgs, StepMode, Verbosity};
pub use config::{Config, CorpusBackend};
