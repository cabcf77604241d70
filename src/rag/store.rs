// In-process corpus store: chunk vectors scanned by cosine similarity
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{DocError, Result};
use crate::rag::chunker::Chunker;
use crate::rag::embedding::{cosine_similarity, Embedder};
use crate::rag::retrieval::{rank, Candidate, CorpusStore, Retriever};
use crate::types::Chunk;

/// Corpus store kept entirely in memory
///
/// Chunks are stored in insertion order, which doubles as the tie-breaker
/// for equal scores. Reads never block each other.
pub struct InMemoryCorpus {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryCorpus {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self {
            embedder,
            chunker,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Chunk, embed and store a document, recording its file name
    pub async fn add_document_from(
        &self,
        id: &str,
        source: &str,
        text: &str,
    ) -> Result<Vec<Chunk>> {
        let pieces = self.chunker.split(text);
        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| DocError::Ingest(format!("Failed to embed '{}': {}", id, e)))?;

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (piece, embedding))| {
                Chunk::new(id, index, piece.span, piece.text, embedding).with_source(source)
            })
            .collect();

        self.insert_chunks(chunks.clone()).await;
        debug!(document_id = %id, chunks = chunks.len(), "Document indexed");
        Ok(chunks)
    }

    /// Store pre-built chunks as-is
    pub async fn insert_chunks(&self, chunks: Vec<Chunk>) {
        self.chunks.write().await.extend(chunks);
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl Retriever for InMemoryCorpus {
    async fn query(&self, text: &str, k: usize, min_score: f32) -> Result<Vec<Chunk>> {
        let query_vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| DocError::Retrieval(format!("Failed to embed query: {}", e)))?;

        let chunks = self.chunks.read().await;
        let candidates = chunks
            .iter()
            .enumerate()
            .map(|(seq, chunk)| Candidate {
                seq: seq as u64,
                chunk: chunk.scored(cosine_similarity(&query_vector, chunk.embedding())),
            })
            .collect();

        Ok(rank(candidates, k, min_score))
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn add_document(&self, id: &str, text: &str) -> Result<Vec<Chunk>> {
        self.add_document_from(id, "", text).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.len().await)
    }
}
