//! Retrieval and answer types
//!
//! Chunks come out of the corpus store, sub-questions out of the planner,
//! research results out of the researcher and the answer out of the
//! synthesizer. All of them are immutable once built.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character range of a chunk inside its source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A retrievable unit of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    document_id: String,
    chunk_id: String,
    source: String,
    span: Span,
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    embedding: Vec<f32>,
    score: f32,
}

impl Chunk {
    /// Build an unscored chunk (ingestion side)
    pub fn new(
        document_id: impl Into<String>,
        index: usize,
        span: Span,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let document_id = document_id.into();
        Self {
            chunk_id: format!("{}_{}", document_id, index),
            document_id,
            source: String::new(),
            span,
            text: text.into(),
            embedding,
            score: 0.0,
        }
    }

    /// Attach the originating file name
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Copy of this chunk scored against a particular query
    pub fn scored(&self, score: f32) -> Self {
        let mut chunk = self.clone();
        chunk.score = score;
        chunk
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    /// Whether a citation points at this chunk
    pub fn backs(&self, citation: &Citation) -> bool {
        self.document_id == citation.document_id
            && self.chunk_id == citation.chunk_id
            && self.span == citation.span
    }
}

/// One decomposed unit of the original query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubQuestion {
    pub text: String,
    pub parent_id: Uuid,
    pub ordinal: usize,
}

impl SubQuestion {
    pub fn new(text: impl Into<String>, parent_id: Uuid, ordinal: usize) -> Self {
        Self {
            text: text.into(),
            parent_id,
            ordinal,
        }
    }
}

/// Chunks retrieved for one sub-question
///
/// The confidence is the highest chunk score, or 0.0 when nothing was
/// retrieved. It is derived on construction and cannot be set, not even
/// by deserializing: a stored confidence is recomputed from the chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredResearchResult")]
pub struct ResearchResult {
    sub_question: SubQuestion,
    chunks: Vec<Chunk>,
    confidence: f64,
}

impl ResearchResult {
    pub fn new(sub_question: SubQuestion, chunks: Vec<Chunk>) -> Self {
        let confidence = Self::aggregate(&chunks);
        Self {
            sub_question,
            chunks,
            confidence,
        }
    }

    /// Max of the chunk scores, clamped into [0, 1]
    pub fn aggregate(chunks: &[Chunk]) -> f64 {
        chunks
            .iter()
            .map(|c| c.score() as f64)
            .filter(|s| !s.is_nan())
            .fold(0.0_f64, f64::max)
            .clamp(0.0, 1.0)
    }

    pub fn sub_question(&self) -> &SubQuestion {
        &self.sub_question
    }

    pub fn ordinal(&self) -> usize {
        self.sub_question.ordinal
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Deserialize)]
struct StoredResearchResult {
    sub_question: SubQuestion,
    chunks: Vec<Chunk>,
}

impl From<StoredResearchResult> for ResearchResult {
    fn from(stored: StoredResearchResult) -> Self {
        Self::new(stored.sub_question, stored.chunks)
    }
}

/// Reference from an answer back to a retrieved chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub chunk_id: String,
    pub span: Span,
}

impl Citation {
    pub fn for_chunk(chunk: &Chunk) -> Self {
        Self {
            document_id: chunk.document_id().to_string(),
            chunk_id: chunk.chunk_id().to_string(),
            span: chunk.span(),
        }
    }
}

/// Final output of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    text: String,
    citations: Vec<Citation>,
    confidence: f64,
}

impl Answer {
    pub fn new(text: impl Into<String>, citations: Vec<Citation>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            citations,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}
