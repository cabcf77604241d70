//! Type definitions module
//!
//! Core data model shared by the orchestrator, the agent steps and the
//! corpus store.

pub mod messages;
pub mod research;

// Re-export commonly used types
pub use messages::{Query, Role, Turn};
pub use research::{Answer, Chunk, Citation, ResearchResult, Span, SubQuestion};
