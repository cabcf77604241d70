//! Answer synthesis
//!
//! Both synthesizers build their citations from the accepted research
//! results only, and both run `verify_citations` before handing an answer
//! back. A citation that does not point at a retrieved chunk is a
//! synthesis error, never a silent drop.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::agent::state::StepKind;
use crate::agent::workflow::AcceptedResult;
use crate::errors::{DocError, Result};
use crate::models::ModelClient;
use crate::steps::{AgentStep, SynthesisRequest};
use crate::types::{Answer, Chunk, Citation};

/// Check the grounding of an answer
///
/// An answer needs at least one citation, and every citation must match
/// a chunk (document, chunk id and span) of some accepted result.
pub fn verify_citations(answer: &Answer, results: &[AcceptedResult]) -> Result<()> {
    if answer.citations().is_empty() {
        return Err(DocError::Synthesis("answer carries no citations".to_string()));
    }

    for citation in answer.citations() {
        let backed = results
            .iter()
            .flat_map(|accepted| accepted.result.chunks())
            .any(|chunk| chunk.backs(citation));
        if !backed {
            return Err(DocError::Synthesis(format!(
                "citation {} ({}..{}) does not match any retrieved chunk",
                citation.chunk_id, citation.span.start, citation.span.end
            )));
        }
    }

    Ok(())
}

/// Mean critic score of the accepted results
///
/// Best-effort acceptances pull this down, which is how they show up in
/// the answer.
pub fn answer_confidence(results: &[AcceptedResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results.iter().map(|r| r.verdict.score).sum();
    (total / results.len() as f64).clamp(0.0, 1.0)
}

/// Answer built from the retrieved text itself
///
/// Takes the best chunk of every accepted result, in sub-question order,
/// and tags each passage with its document id.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSynthesizer;

impl ExtractiveSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentStep for ExtractiveSynthesizer {
    type Input = SynthesisRequest;
    type Output = Answer;

    fn kind(&self) -> StepKind {
        StepKind::Synthesizer
    }

    async fn run(&self, request: SynthesisRequest) -> Result<Answer> {
        let mut passages = Vec::new();
        let mut citations = Vec::new();
        let mut seen = HashSet::new();

        for accepted in &request.results {
            // Chunks arrive ranked, the first is the strongest
            let Some(best) = accepted.result.chunks().first() else {
                continue;
            };
            if !seen.insert(best.chunk_id().to_string()) {
                continue;
            }
            passages.push(format!("{} [{}]", best.text().trim(), best.document_id()));
            citations.push(Citation::for_chunk(best));
        }

        if passages.is_empty() {
            return Err(DocError::Synthesis(format!(
                "no retrieved context to answer '{}'",
                request.query.text()
            )));
        }

        let answer = Answer::new(
            passages.join("\n\n"),
            citations,
            answer_confidence(&request.results),
        );
        verify_citations(&answer, &request.results)?;
        Ok(answer)
    }
}

/// Answer written by a language model over numbered sources
///
/// The model must cite with `[n]` markers. Markers are resolved back to
/// chunks; an unknown index fails the step.
pub struct ModelSynthesizer {
    client: Arc<dyn ModelClient>,
}

impl ModelSynthesizer {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    fn sources(results: &[AcceptedResult]) -> Vec<&Chunk> {
        let mut seen = HashSet::new();
        results
            .iter()
            .flat_map(|accepted| accepted.result.chunks())
            .filter(|chunk| seen.insert(chunk.chunk_id().to_string()))
            .collect()
    }

    fn build_prompt(request: &SynthesisRequest, sources: &[&Chunk]) -> String {
        let mut prompt = String::from(
            "Answer the question using ONLY the numbered sources below. \
             Cite every statement with the source number in square brackets, \
             like [1]. Do not cite sources that are not listed.\n\n",
        );

        for (i, chunk) in sources.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, chunk.text().trim()));
        }

        prompt.push_str("\nSUB-QUESTIONS RESEARCHED:\n");
        for accepted in &request.results {
            prompt.push_str(&format!("- {}\n", accepted.result.sub_question().text));
        }

        prompt.push_str(&format!("\nQUESTION: {}\nANSWER:", request.query.text()));
        prompt
    }

    /// Resolve `[n]` markers in order of first appearance
    fn resolve_markers(text: &str, sources: &[&Chunk]) -> Result<Vec<Citation>> {
        let marker = Regex::new(r"\[(\d+)\]")
            .map_err(|e| DocError::Synthesis(format!("citation pattern: {}", e)))?;

        let mut citations = Vec::new();
        let mut seen = HashSet::new();
        for caps in marker.captures_iter(text) {
            let index: usize = caps[1]
                .parse()
                .map_err(|_| DocError::Synthesis(format!("bad citation marker {}", &caps[0])))?;
            let chunk = index
                .checked_sub(1)
                .and_then(|i| sources.get(i))
                .ok_or_else(|| {
                    DocError::Synthesis(format!(
                        "answer cites source [{}] but only {} were given",
                        index,
                        sources.len()
                    ))
                })?;
            if seen.insert(index) {
                citations.push(Citation::for_chunk(chunk));
            }
        }
        Ok(citations)
    }
}

#[async_trait]
impl AgentStep for ModelSynthesizer {
    type Input = SynthesisRequest;
    type Output = Answer;

    fn kind(&self) -> StepKind {
        StepKind::Synthesizer
    }

    async fn run(&self, request: SynthesisRequest) -> Result<Answer> {
        let sources = Self::sources(&request.results);
        if sources.is_empty() {
            return Err(DocError::Synthesis(format!(
                "no retrieved context to answer '{}'",
                request.query.text()
            )));
        }

        let prompt = Self::build_prompt(&request, &sources);
        let text = self
            .client
            .generate(&prompt)
            .await
            .map_err(|e| DocError::Synthesis(format!("model call failed: {}", e)))?;
        let text = text.trim().to_string();

        let citations = Self::resolve_markers(&text, &sources)?;
        debug!(citations = citations.len(), sources = sources.len(), "Answer drafted");

        let answer = Answer::new(text, citations, answer_confidence(&request.results));
        verify_citations(&answer, &request.results)?;
        Ok(answer)
    }
}
