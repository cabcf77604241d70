// Researcher: one retrieval round per sub-question
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::agent::state::StepKind;
use crate::errors::{DocError, Result};
use crate::rag::retrieval::{Retriever, SearchParams};
use crate::steps::AgentStep;
use crate::types::{ResearchResult, SubQuestion};

/// Researcher that queries a corpus store with the sub-question text
pub struct RetrievalResearcher {
    retriever: Arc<dyn Retriever>,
    params: SearchParams,
}

impl RetrievalResearcher {
    pub fn new(retriever: Arc<dyn Retriever>, params: SearchParams) -> Self {
        Self { retriever, params }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }
}

#[async_trait]
impl AgentStep for RetrievalResearcher {
    type Input = SubQuestion;
    type Output = ResearchResult;

    fn kind(&self) -> StepKind {
        StepKind::Researcher
    }

    async fn run(&self, sub_question: SubQuestion) -> Result<ResearchResult> {
        let mut chunks = self
            .retriever
            .search(&sub_question.text, &self.params)
            .await
            .map_err(|e| match e {
                DocError::Retrieval(_) | DocError::Cancelled => e,
                other => DocError::Retrieval(other.to_string()),
            })?;

        // Stores are expected to honor k; do not trust them to
        chunks.truncate(self.params.top_k);

        debug!(
            ordinal = sub_question.ordinal,
            chunks = chunks.len(),
            "Retrieved chunks"
        );
        Ok(ResearchResult::new(sub_question, chunks))
    }
}
