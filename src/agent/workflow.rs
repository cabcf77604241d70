//! Per-query workflow state
//!
//! Exactly one `WorkflowState` exists per in-flight query. The orchestrator
//! owns it for the whole run and threads it by `&mut` through the driver
//! loop; agent steps only ever see cloned slices of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::state::{PhaseEvent, WorkflowPhase};
use crate::errors::{DocError, Result};
use crate::types::{Answer, Query, ResearchResult, SubQuestion};

/// Critic decision for one sub-question
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Critic score in [0, 1]
    pub score: f64,
    /// Accepted below threshold because the retry budget ran out
    pub best_effort: bool,
}

/// Research result that passed critique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedResult {
    pub result: ResearchResult,
    pub verdict: Verdict,
}

/// One recorded phase change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub at: DateTime<Utc>,
}

/// Mutable state of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    query: Query,
    phase: WorkflowPhase,
    sub_questions: Vec<SubQuestion>,
    results: BTreeMap<usize, ResearchResult>,
    verdicts: BTreeMap<usize, Verdict>,
    retries: BTreeMap<usize, u32>,
    attempts: BTreeMap<usize, u32>,
    answer: Option<Answer>,
    trace: Vec<PhaseTransition>,
}

impl WorkflowState {
    /// Fresh state in the Planning phase
    pub fn new(query: Query) -> Self {
        Self {
            query,
            phase: WorkflowPhase::Planning,
            sub_questions: Vec::new(),
            results: BTreeMap::new(),
            verdicts: BTreeMap::new(),
            retries: BTreeMap::new(),
            attempts: BTreeMap::new(),
            answer: None,
            trace: Vec::new(),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn sub_questions(&self) -> &[SubQuestion] {
        &self.sub_questions
    }

    /// Research results keyed by sub-question ordinal
    pub fn results(&self) -> &BTreeMap<usize, ResearchResult> {
        &self.results
    }

    pub fn result(&self, ordinal: usize) -> Option<&ResearchResult> {
        self.results.get(&ordinal)
    }

    pub fn verdict(&self, ordinal: usize) -> Option<Verdict> {
        self.verdicts.get(&ordinal).copied()
    }

    /// Retries consumed by a sub-question
    pub fn retries(&self, ordinal: usize) -> u32 {
        self.retries.get(&ordinal).copied().unwrap_or(0)
    }

    /// Researcher invocations made for a sub-question
    pub fn attempts(&self, ordinal: usize) -> u32 {
        self.attempts.get(&ordinal).copied().unwrap_or(0)
    }

    /// Retries consumed across all sub-questions
    pub fn total_retries(&self) -> u32 {
        self.retries.values().sum()
    }

    pub fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    pub fn trace(&self) -> &[PhaseTransition] {
        &self.trace
    }

    /// Apply an event to the phase machine and record it
    pub fn advance(&mut self, event: PhaseEvent) -> Result<WorkflowPhase> {
        let next = self.phase.transition(event)?;
        self.trace.push(PhaseTransition {
            from: self.phase,
            to: next,
            at: Utc::now(),
        });
        self.phase = next;
        Ok(next)
    }

    /// Install the planner output
    ///
    /// Blank entries are dropped and the list is capped at `max`. An empty
    /// plan becomes a single sub-question carrying the original query text.
    pub fn set_plan(&mut self, plan: Vec<String>, max: usize) {
        let parent = self.query.request_id();
        let mut texts: Vec<String> = plan
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(max.max(1))
            .collect();

        if texts.is_empty() {
            texts.push(self.query.text().to_string());
        }

        self.sub_questions = texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| SubQuestion::new(text, parent, ordinal))
            .collect();
    }

    /// Sub-questions that still need a researcher call
    pub fn pending_research(&self) -> Vec<SubQuestion> {
        self.sub_questions
            .iter()
            .filter(|sq| !self.results.contains_key(&sq.ordinal))
            .cloned()
            .collect()
    }

    /// Results that have not been critiqued yet, in ordinal order
    pub fn awaiting_critique(&self) -> Vec<ResearchResult> {
        self.results
            .values()
            .filter(|r| !self.verdicts.contains_key(&r.ordinal()))
            .cloned()
            .collect()
    }

    pub fn record_attempt(&mut self, ordinal: usize) {
        *self.attempts.entry(ordinal).or_insert(0) += 1;
    }

    /// Store a fresh research result
    ///
    /// Accepted results are never overwritten.
    pub fn record_result(&mut self, result: ResearchResult) -> Result<()> {
        let ordinal = result.ordinal();
        if ordinal >= self.sub_questions.len() {
            return Err(DocError::Retrieval(format!(
                "result for unknown sub-question {}",
                ordinal
            )));
        }
        if self.verdicts.contains_key(&ordinal) {
            return Err(DocError::Retrieval(format!(
                "sub-question {} already accepted",
                ordinal
            )));
        }
        self.results.insert(ordinal, result);
        Ok(())
    }

    /// Whether a sub-question may still spend a retry
    pub fn has_retry_left(&self, ordinal: usize, max_retries: u32) -> bool {
        self.retries(ordinal) < max_retries
    }

    /// Spend one retry for a sub-question
    pub fn consume_retry(&mut self, ordinal: usize) {
        *self.retries.entry(ordinal).or_insert(0) += 1;
    }

    /// Discard a rejected result so the sub-question is researched again
    pub fn reject(&mut self, ordinal: usize) {
        self.consume_retry(ordinal);
        self.results.remove(&ordinal);
    }

    pub fn accept(&mut self, ordinal: usize, verdict: Verdict) {
        self.verdicts.insert(ordinal, verdict);
    }

    /// Every sub-question has an accepted result
    pub fn all_accepted(&self) -> bool {
        !self.sub_questions.is_empty()
            && self
                .sub_questions
                .iter()
                .all(|sq| self.verdicts.contains_key(&sq.ordinal))
    }

    /// Accepted results in sub-question order
    pub fn accepted_results(&self) -> Vec<AcceptedResult> {
        self.sub_questions
            .iter()
            .filter_map(|sq| {
                let result = self.results.get(&sq.ordinal)?;
                let verdict = self.verdicts.get(&sq.ordinal)?;
                Some(AcceptedResult {
                    result: result.clone(),
                    verdict: *verdict,
                })
            })
            .collect()
    }

    /// Ordinals accepted under the best-effort policy
    pub fn best_effort_ordinals(&self) -> Vec<usize> {
        self.verdicts
            .iter()
            .filter(|(_, v)| v.best_effort)
            .map(|(o, _)| *o)
            .collect()
    }

    pub fn set_answer(&mut self, answer: Answer) {
        self.answer = Some(answer);
    }
}
