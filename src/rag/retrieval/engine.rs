// Retrieval contract between the researcher and the corpus store
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::Chunk;

/// Search parameters for retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of chunks to return
    pub top_k: usize,
    /// Minimum relevance score a chunk must reach
    pub min_score: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
        }
    }
}

/// Nearest-neighbor lookup over stored chunks
///
/// Results come back highest score first, ties in insertion order. An
/// empty vector means nothing reached `min_score`; errors mean the store
/// could not be queried at all.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn query(&self, text: &str, k: usize, min_score: f32) -> Result<Vec<Chunk>>;

    /// Query with a parameter bundle
    async fn search(&self, text: &str, params: &SearchParams) -> Result<Vec<Chunk>> {
        self.query(text, params.top_k, params.min_score).await
    }
}

/// Write side of a corpus store
///
/// The orchestrator never calls these; they exist for ingestion.
#[async_trait]
pub trait CorpusStore: Retriever {
    /// Chunk, embed and store a document
    async fn add_document(&self, id: &str, text: &str) -> Result<Vec<Chunk>>;

    /// Embed text with the store's embedder
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Number of stored chunks
    async fn chunk_count(&self) -> Result<usize>;
}

/// Candidate chunk tagged with its insertion sequence number
#[derive(Debug, Clone)]
pub struct Candidate {
    pub seq: u64,
    pub chunk: Chunk,
}

/// Filter, order and cut a candidate list
///
/// Drops anything below `min_score` (and NaN scores), sorts by score
/// descending with insertion order breaking ties, keeps the first `k`.
pub fn rank(mut candidates: Vec<Candidate>, k: usize, min_score: f32) -> Vec<Chunk> {
    candidates.retain(|c| !c.chunk.score().is_nan() && c.chunk.score() >= min_score);
    candidates.sort_by(|a, b| {
        b.chunk
            .score()
            .partial_cmp(&a.chunk.score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    candidates.truncate(k);
    candidates.into_iter().map(|c| c.chunk).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Span;

    fn candidate(seq: u64, score: f32) -> Candidate {
        Candidate {
            seq,
            chunk: Chunk::new("doc", seq as usize, Span::new(0, 1), "x", vec![]).scored(score),
        }
    }

    #[test]
    fn test_search_params_default() {
        let params = SearchParams::default();
        assert_eq!(params.top_k, 5);
        assert!(params.min_score > 0.0);
    }

    #[test]
    fn test_rank_orders_by_score() {
        let ranked = rank(
            vec![candidate(0, 0.4), candidate(1, 0.9), candidate(2, 0.6)],
            10,
            0.0,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.chunk_id().to_string()).collect();
        assert_eq!(ids, vec!["doc_1", "doc_2", "doc_0"]);
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let ranked = rank(
            vec![candidate(2, 0.5), candidate(0, 0.5), candidate(1, 0.5)],
            10,
            0.0,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.chunk_id().to_string()).collect();
        assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
    }

    #[test]
    fn test_rank_applies_threshold_and_k() {
        let ranked = rank(
            vec![
                candidate(0, 0.2),
                candidate(1, 0.8),
                candidate(2, 0.7),
                candidate(3, f32::NAN),
            ],
            1,
            0.5,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id(), "doc_1");

        assert!(rank(vec![candidate(0, 0.1)], 3, 0.5).is_empty());
    }
}
