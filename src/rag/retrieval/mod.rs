// Retrieval contract module
pub mod engine;

pub use engine::{rank, Candidate, CorpusStore, Retriever, SearchParams};
