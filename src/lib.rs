//! DocBuddy - grounded question answering over local documentation
//!
//! A query is decomposed, researched against a corpus store, critiqued and
//! synthesized into an answer whose every citation points at a retrieved
//! chunk.
//!
//! # Architecture
//!
//! - **agent**: phase machine, per-query state, orchestrator
//! - **steps**: planner, researcher, critic and synthesizer implementations
//! - **rag**: loading, chunking, embedding and the corpus stores
//! - **session**: wire types, stateless handler, chat sessions
//! - **cli / bootstrap / repl / telemetry**: the command-line front end

pub mod agent;
pub mod errors;
pub mod models;
pub mod rag;
pub mod steps;
pub mod types;

// Re-export commonly used types
pub use agent::{Failure, Orchestrator, WorkflowConfig};
pub use errors::{DocError, Result};

// Front end
pub mod bootstrap;
pub mod cli;
pub mod repl;
pub mod session;
pub mod telemetry;
