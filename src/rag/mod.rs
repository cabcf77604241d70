// Retrieval-augmented generation plumbing
//
// Everything between a raw document on disk and a ranked list of chunks:
// - Loader: text and markdown files
// - Chunker: header-aware, overlapping windows
// - Embedding: Ollama or deterministic hashing
// - Stores: in-memory or Qdrant, behind the Retriever contract

pub mod chunker;
pub mod embedding;
pub mod loader;
pub mod qdrant;
pub mod retrieval;
pub mod store;

// Re-export key types
pub use chunker::{document_id, Chunker, ChunkerConfig, TextPiece};
pub use embedding::{Embedder, HashingEmbedder, OllamaEmbedder};
pub use loader::{load_path, load_paths, SourceDocument};
pub use qdrant::QdrantCorpus;
pub use retrieval::{CorpusStore, Retriever, SearchParams};
pub use store::InMemoryCorpus;
