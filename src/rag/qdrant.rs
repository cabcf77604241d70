// Corpus store backed by a Qdrant collection
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        point_id::PointIdOptions, vectors_config::Config, with_payload_selector::SelectorOptions,
        with_vectors_selector, CreateCollection, Distance, PointId, PointStruct, SearchPoints,
        Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
        WithVectorsSelector,
    },
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{DocError, Result};
use crate::rag::chunker::Chunker;
use crate::rag::embedding::Embedder;
use crate::rag::retrieval::{rank, Candidate, CorpusStore, Retriever};
use crate::types::{Chunk, Span};

const FIELD_DOCUMENT: &str = "document";
const FIELD_DOCUMENT_ID: &str = "document_id";
const FIELD_CHUNK_INDEX: &str = "chunk_index";
const FIELD_SOURCE: &str = "source";
const FIELD_SPAN_START: &str = "span_start";
const FIELD_SPAN_END: &str = "span_end";
const FIELD_SEQ: &str = "seq";

/// Candidates fetched per requested result, so ties at the cut are
/// ordered locally by insertion sequence
const OVERFETCH: usize = 2;

/// Point id of a chunk
///
/// Derived from the chunk id, so re-adding a document overwrites its
/// points instead of duplicating them.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn search_limit(k: usize) -> u64 {
    k.saturating_mul(OVERFETCH) as u64
}

/// Corpus store over a Qdrant collection with cosine distance
///
/// Every point carries an insertion sequence number in its payload so that
/// equal scores can be ordered the same way the in-memory store does.
pub struct QdrantCorpus {
    client: QdrantClient,
    collection: String,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    next_seq: AtomicU64,
}

impl QdrantCorpus {
    /// Connect and make sure the collection exists
    pub async fn connect(
        url: &str,
        collection: &str,
        dimension: u64,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
    ) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| DocError::Config(format!("Failed to create Qdrant client: {}", e)))?;

        let corpus = Self {
            client,
            collection: collection.to_string(),
            embedder,
            chunker,
            next_seq: AtomicU64::new(0),
        };

        corpus.ensure_collection(dimension).await?;
        let existing = corpus.point_count().await?;
        corpus.next_seq.store(existing, Ordering::SeqCst);

        info!(url = %url, collection = %collection, points = existing, "Qdrant corpus ready");
        Ok(corpus)
    }

    async fn ensure_collection(&self, dimension: u64) -> Result<()> {
        let collections_list = self
            .client
            .list_collections()
            .await
            .map_err(|e| DocError::Retrieval(format!("Failed to list collections: {}", e)))?;

        let exists = collections_list
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: dimension,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    DocError::Retrieval(format!(
                        "Failed to create collection {}: {}",
                        self.collection, e
                    ))
                })?;
        }

        Ok(())
    }

    async fn point_count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| DocError::Retrieval(format!("Failed to get collection info: {}", e)))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    /// Insertion sequence numbers of points already stored under these ids
    async fn stored_seqs(&self, ids: &[String]) -> Result<HashMap<String, u64>> {
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        let response = self
            .client
            .get_points(
                &self.collection,
                None,
                &point_ids,
                Some(WithVectorsSelector {
                    selector_options: Some(with_vectors_selector::SelectorOptions::Enable(false)),
                }),
                Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                None,
            )
            .await
            .map_err(|e| DocError::Ingest(format!("Failed to read existing points: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id?.point_id_options? {
                    PointIdOptions::Uuid(uuid) => uuid,
                    PointIdOptions::Num(n) => n.to_string(),
                };
                let seq = point.payload.get(FIELD_SEQ).and_then(value_to_i64)?;
                Some((id, seq as u64))
            })
            .collect())
    }

    /// Chunk, embed and upsert a document, recording its file name
    ///
    /// Chunks already stored keep their insertion sequence number.
    pub async fn add_document_from(
        &self,
        id: &str,
        source: &str,
        text: &str,
    ) -> Result<Vec<Chunk>> {
        let pieces = self.chunker.split(text);
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| DocError::Ingest(format!("Failed to embed '{}': {}", id, e)))?;

        let ids: Vec<String> = (0..pieces.len())
            .map(|index| point_id(&format!("{}_{}", id, index)))
            .collect();
        let stored = self.stored_seqs(&ids).await?;

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut points = Vec::with_capacity(pieces.len());

        for (index, (piece, embedding)) in pieces.into_iter().zip(embeddings).enumerate() {
            let seq = match stored.get(&ids[index]) {
                Some(seq) => *seq,
                None => self.next_seq.fetch_add(1, Ordering::SeqCst),
            };

            let mut payload: HashMap<String, QdrantValue> = HashMap::new();
            payload.insert(FIELD_DOCUMENT.to_string(), QdrantValue::from(piece.text.clone()));
            payload.insert(FIELD_DOCUMENT_ID.to_string(), QdrantValue::from(id.to_string()));
            payload.insert(FIELD_CHUNK_INDEX.to_string(), QdrantValue::from(index as i64));
            payload.insert(FIELD_SOURCE.to_string(), QdrantValue::from(source.to_string()));
            payload.insert(
                FIELD_SPAN_START.to_string(),
                QdrantValue::from(piece.span.start as i64),
            );
            payload.insert(FIELD_SPAN_END.to_string(), QdrantValue::from(piece.span.end as i64));
            payload.insert(FIELD_SEQ.to_string(), QdrantValue::from(seq as i64));

            let chunk =
                Chunk::new(id, index, piece.span, piece.text, embedding.clone()).with_source(source);
            points.push(PointStruct::new(ids[index].clone(), embedding, payload));
            chunks.push(chunk);
        }

        self.client
            .upsert_points_blocking(&self.collection, None, points, None)
            .await
            .map_err(|e| DocError::Ingest(format!("Failed to upsert points: {}", e)))?;

        debug!(document_id = %id, chunks = chunks.len(), "Document indexed in Qdrant");
        Ok(chunks)
    }
}

#[async_trait]
impl Retriever for QdrantCorpus {
    async fn query(&self, text: &str, k: usize, min_score: f32) -> Result<Vec<Chunk>> {
        let query_vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| DocError::Retrieval(format!("Failed to embed query: {}", e)))?;

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: query_vector,
                limit: search_limit(k),
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                score_threshold: Some(min_score),
                ..Default::default()
            })
            .await
            .map_err(|e| DocError::Retrieval(format!("Failed to search points: {}", e)))?;

        let candidates = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;
                let document_id = payload.get(FIELD_DOCUMENT_ID).and_then(value_to_string)?;
                let text = payload.get(FIELD_DOCUMENT).and_then(value_to_string)?;
                let index = payload.get(FIELD_CHUNK_INDEX).and_then(value_to_i64)? as usize;
                let source = payload
                    .get(FIELD_SOURCE)
                    .and_then(value_to_string)
                    .unwrap_or_default();
                let start = payload.get(FIELD_SPAN_START).and_then(value_to_i64)? as usize;
                let end = payload.get(FIELD_SPAN_END).and_then(value_to_i64)? as usize;
                let seq = payload.get(FIELD_SEQ).and_then(value_to_i64).unwrap_or(0) as u64;

                let chunk = Chunk::new(document_id, index, Span::new(start, end), text, Vec::new())
                    .with_source(source)
                    .scored(point.score);
                Some(Candidate { seq, chunk })
            })
            .collect();

        Ok(rank(candidates, k, min_score))
    }
}

#[async_trait]
impl CorpusStore for QdrantCorpus {
    async fn add_document(&self, id: &str, text: &str) -> Result<Vec<Chunk>> {
        self.add_document_from(id, "", text).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.point_count().await? as usize)
    }
}

fn value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

fn value_to_i64(value: &QdrantValue) -> Option<i64> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::IntegerValue(i) => Some(*i),
            Kind::DoubleValue(f) => Some(*f as i64),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedding::HashingEmbedder;

    #[test]
    fn test_payload_value_helpers() {
        assert_eq!(
            value_to_string(&QdrantValue::from("abc".to_string())),
            Some("abc".to_string())
        );
        assert_eq!(value_to_i64(&QdrantValue::from(42i64)), Some(42));
        assert_eq!(value_to_i64(&QdrantValue::from("x".to_string())), None);
    }

    #[test]
    fn test_point_id_is_stable_per_chunk() {
        assert_eq!(point_id("guide_0"), point_id("guide_0"));
        assert_ne!(point_id("guide_0"), point_id("guide_1"));
        assert_ne!(point_id("guide_0"), point_id("guides_0"));
        assert!(Uuid::parse_str(&point_id("guide_0")).is_ok());
    }

    #[test]
    fn test_search_fetches_past_the_cut() {
        assert_eq!(search_limit(3), 6);
        assert_eq!(search_limit(0), 0);
        assert_eq!(search_limit(usize::MAX), usize::MAX as u64);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_add_and_query() {
        let corpus = QdrantCorpus::connect(
            "http://localhost:6334",
            "docbuddy_test",
            384,
            Arc::new(HashingEmbedder::default()),
            Chunker::default(),
        )
        .await
        .unwrap();

        corpus
            .add_document("guide", "# Retries\nmaxRetries defaults to 2")
            .await
            .unwrap();

        let results = corpus.query("retry limit", 3, 0.0).await.unwrap();
        assert_eq!(results[0].document_id(), "guide");
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_re_adding_document_overwrites_points() {
        let corpus = QdrantCorpus::connect(
            "http://localhost:6334",
            "docbuddy_test_readd",
            384,
            Arc::new(HashingEmbedder::default()),
            Chunker::default(),
        )
        .await
        .unwrap();

        corpus.add_document("readd", "maxRetries defaults to 2").await.unwrap();
        let before = corpus.chunk_count().await.unwrap();
        corpus.add_document("readd", "maxRetries defaults to 2").await.unwrap();
        assert_eq!(corpus.chunk_count().await.unwrap(), before);

        let results = corpus.query("maxRetries", 5, 0.0).await.unwrap();
        let copies = results.iter().filter(|c| c.chunk_id() == "readd_0").count();
        assert_eq!(copies, 1);
    }
}
