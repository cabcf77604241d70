//! Language model access
//!
//! The model client is built once by whoever assembles the orchestrator
//! and handed to the agent steps that need it.

pub mod client;

// Re-export key types for convenience
pub use client::{ModelClient, OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
