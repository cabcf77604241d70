//! Workflow orchestrator - main coordinator
//!
//! Drives one query through Planner → {Researcher → Critic}* → Synthesizer:
//! - Phase machine transitions (see `agent::state`)
//! - Per-sub-question retry budgets with best-effort acceptance
//! - Concurrent research rounds joined at a barrier
//! - Cooperative cancellation at every phase boundary
//!
//! Every run ends with an `Answer` or a `Failure`; step errors never
//! escape as anything else.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::state::{PhaseEvent, WorkflowPhase};
use crate::agent::workflow::{Verdict, WorkflowState};
use crate::errors::{DocError, Result};
use crate::steps::{verify_citations, CritiqueRequest, PlanRequest, StepSet, SynthesisRequest};
use crate::types::{Answer, Query, ResearchResult};

/// Upper bound for a single retry backoff (16 seconds)
const MAX_BACKOFF_MS: u64 = 16_000;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Chunks requested per sub-question
    pub top_k: usize,

    /// Minimum retrieval score for a chunk to count
    pub min_score: f32,

    /// Cap on planner output
    pub max_subquestions: usize,

    /// Retries each sub-question may spend (retrieval errors and rejections)
    pub max_retries_per_subquestion: u32,

    /// Critic score a result needs to be accepted outright
    pub critique_threshold: f64,

    /// Researcher calls allowed in flight at once
    pub max_parallel_research: usize,

    /// Chunks the critic wants before trusting a result
    pub min_supporting_chunks: usize,

    /// Base delay before re-researching after a retrieval error (0 disables)
    pub retry_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            max_subquestions: 4,
            max_retries_per_subquestion: 2,
            critique_threshold: 0.5,
            max_parallel_research: 4,
            min_supporting_chunks: 1,
            retry_backoff_ms: 250,
        }
    }
}

impl WorkflowConfig {
    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(DocError::Config("top_k must be greater than 0".to_string()));
        }

        if self.max_subquestions == 0 {
            return Err(DocError::Config(
                "max_subquestions must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(DocError::Config(
                "min_score must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.critique_threshold) {
            return Err(DocError::Config(
                "critique_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_parallel_research == 0 {
            return Err(DocError::Config(
                "max_parallel_research must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Delay before the given retry (1-based), capped and jittered ±25%
    pub fn backoff(&self, retry: u32) -> Duration {
        if self.retry_backoff_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = retry.saturating_sub(1).min(16);
        let delay_ms = self
            .retry_backoff_ms
            .saturating_mul(2u64.pow(exponent))
            .min(MAX_BACKOFF_MS);

        let jitter = (delay_ms / 4) as f64;
        let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
        Duration::from_millis(((delay_ms as f64) + random_jitter).max(0.0) as u64)
    }
}

/// Structured failure of a run: the phase that failed and why
#[derive(Debug, thiserror::Error)]
#[error("{} failed: {error}", .step.display_name())]
pub struct Failure {
    pub step: WorkflowPhase,
    pub error: DocError,
}

impl Failure {
    /// Stable cause name (`RetrievalError`, `Cancelled`, ...)
    pub fn cause(&self) -> &'static str {
        self.error.kind()
    }
}

/// Final state of a run alongside its outcome
#[derive(Debug)]
pub struct WorkflowRun {
    pub state: WorkflowState,
    pub outcome: std::result::Result<Answer, Failure>,
}

/// Main workflow orchestrator
///
/// Holds no per-query state; one orchestrator can serve any number of
/// concurrent runs, each with its own `WorkflowState`.
pub struct Orchestrator {
    steps: StepSet,
    config: WorkflowConfig,
}

impl Orchestrator {
    /// Create an orchestrator, checking the step table and configuration
    pub fn new(steps: StepSet, config: WorkflowConfig) -> Result<Self> {
        config.validate()?;

        let slots = [
            (WorkflowPhase::Planning, steps.planner.kind()),
            (WorkflowPhase::Researching, steps.researcher.kind()),
            (WorkflowPhase::Critiquing, steps.critic.kind()),
            (WorkflowPhase::Synthesizing, steps.synthesizer.kind()),
        ];
        for (phase, kind) in slots {
            if phase.step() != Some(kind) {
                return Err(DocError::Config(format!(
                    "{} step installed for the {} phase",
                    kind.name(),
                    phase.display_name()
                )));
            }
        }

        Ok(Self { steps, config })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Answer a query
    #[tracing::instrument(skip(self, query), fields(request_id = %query.request_id()))]
    pub async fn run(&self, query: Query) -> std::result::Result<Answer, Failure> {
        self.execute(query, CancellationToken::new()).await.outcome
    }

    /// Answer a query, returning the final workflow state as well
    pub async fn execute(&self, query: Query, cancel: CancellationToken) -> WorkflowRun {
        info!(request_id = %query.request_id(), "Run started");
        let mut state = WorkflowState::new(query);
        let outcome = self.drive(&mut state, &cancel).await;

        match &outcome {
            Ok(answer) => info!(
                request_id = %state.query().request_id(),
                citations = answer.citations().len(),
                confidence = answer.confidence(),
                retries = state.total_retries(),
                "Run finished"
            ),
            Err(failure) => warn!(
                request_id = %state.query().request_id(),
                step = failure.step.wire_name(),
                cause = failure.cause(),
                "Run failed: {}",
                failure.error
            ),
        }

        WorkflowRun { state, outcome }
    }

    /// Driver loop: one phase handler per iteration until a terminal phase
    async fn drive(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> std::result::Result<Answer, Failure> {
        loop {
            let phase = state.phase();

            match phase {
                WorkflowPhase::Done => {
                    return state.answer().cloned().ok_or_else(|| Failure {
                        step: WorkflowPhase::Synthesizing,
                        error: DocError::Synthesis("no answer recorded".to_string()),
                    });
                }
                WorkflowPhase::Failed => {
                    return Err(Failure {
                        step: phase,
                        error: DocError::InvalidTransition {
                            from: phase.display_name().to_string(),
                            to: phase.display_name().to_string(),
                            reason: "run already failed".to_string(),
                        },
                    });
                }
                _ => {}
            }

            if cancel.is_cancelled() {
                return Err(self.fail(state, DocError::Cancelled));
            }

            let outcome = match phase {
                WorkflowPhase::Planning => self.plan(state).await,
                WorkflowPhase::Researching => self.research(state, cancel).await,
                WorkflowPhase::Critiquing => self.critique(state).await,
                WorkflowPhase::Synthesizing => self.synthesize(state).await,
                WorkflowPhase::Done | WorkflowPhase::Failed => continue,
            };

            let event = match outcome {
                Ok(event) => event,
                Err(error) => return Err(self.fail(state, error)),
            };

            match state.advance(event) {
                Ok(next) => debug!(
                    request_id = %state.query().request_id(),
                    from = phase.wire_name(),
                    to = next.wire_name(),
                    "Phase transition"
                ),
                Err(error) => return Err(self.fail(state, error)),
            }
        }
    }

    /// Move the state to Failed and build the failure for the current phase
    fn fail(&self, state: &mut WorkflowState, error: DocError) -> Failure {
        let step = state.phase();
        let event = match error {
            DocError::Cancelled => PhaseEvent::Cancelled,
            _ => PhaseEvent::StepFailed,
        };
        if let Err(e) = state.advance(event) {
            warn!("Could not record failure transition: {}", e);
        }
        Failure { step, error }
    }

    async fn plan(&self, state: &mut WorkflowState) -> Result<PhaseEvent> {
        let request = PlanRequest {
            query: state.query().clone(),
            max_subquestions: self.config.max_subquestions,
        };
        let plan = self.steps.planner.run(request).await?;

        if plan.is_empty() {
            info!(
                request_id = %state.query().request_id(),
                "Planner returned no sub-questions, researching the query as a whole"
            );
        }

        state.set_plan(plan, self.config.max_subquestions);
        debug!(sub_questions = state.sub_questions().len(), "Plan installed");
        Ok(PhaseEvent::PlanReady)
    }

    /// One research round over every pending sub-question
    ///
    /// Tasks only produce results; the state is written after the barrier,
    /// in ordinal order. On cancellation the outstanding tasks are aborted
    /// and drained before returning, so nothing writes afterwards.
    async fn research(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<PhaseEvent> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_research));
        let mut tasks = JoinSet::new();

        for sub_question in state.pending_research() {
            state.record_attempt(sub_question.ordinal);
            let researcher = Arc::clone(&self.steps.researcher);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let ordinal = sub_question.ordinal;
                (ordinal, researcher.run(sub_question).await)
            });
        }

        let mut outcomes: Vec<(usize, Result<ResearchResult>)> = Vec::with_capacity(tasks.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.shutdown().await;
                    return Err(DocError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => outcomes.push(outcome),
                    Some(Err(e)) => {
                        tasks.shutdown().await;
                        return Err(DocError::Retrieval(format!("research task failed: {}", e)));
                    }
                    None => break,
                },
            }
        }

        outcomes.sort_by_key(|(ordinal, _)| *ordinal);

        let mut highest_retry = 0;
        for (ordinal, outcome) in outcomes {
            match outcome {
                Ok(result) => state.record_result(result)?,
                Err(error) if error.is_retryable() => {
                    if !state.has_retry_left(ordinal, self.config.max_retries_per_subquestion) {
                        warn!(
                            ordinal,
                            "{}",
                            DocError::RetryBudgetExhausted {
                                ordinal,
                                attempts: state.attempts(ordinal),
                            }
                        );
                        return Err(error);
                    }
                    state.consume_retry(ordinal);
                    highest_retry = highest_retry.max(state.retries(ordinal));
                    warn!(
                        ordinal,
                        retry = state.retries(ordinal),
                        "Retrieval failed, will retry: {}",
                        error
                    );
                }
                Err(error) => return Err(error),
            }
        }

        if state.pending_research().is_empty() {
            return Ok(PhaseEvent::ResearchComplete);
        }

        let delay = self.config.backoff(highest_retry);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before next research round");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DocError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Ok(PhaseEvent::ResearchIncomplete)
    }

    /// Score every uncritiqued result, rejecting or accepting each
    async fn critique(&self, state: &mut WorkflowState) -> Result<PhaseEvent> {
        let mut rejected = false;

        for result in state.awaiting_critique() {
            let ordinal = result.ordinal();
            let request = CritiqueRequest {
                sub_question: result.sub_question().clone(),
                result,
            };
            let raw = self.steps.critic.run(request).await?;
            let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

            if score >= self.config.critique_threshold {
                state.accept(ordinal, Verdict { score, best_effort: false });
                continue;
            }

            if state.has_retry_left(ordinal, self.config.max_retries_per_subquestion) {
                state.reject(ordinal);
                rejected = true;
                warn!(
                    ordinal,
                    score,
                    retry = state.retries(ordinal),
                    "Result below threshold, researching again"
                );
            } else {
                warn!(
                    ordinal,
                    score,
                    "{}; accepting best effort",
                    DocError::RetryBudgetExhausted {
                        ordinal,
                        attempts: state.attempts(ordinal),
                    }
                );
                state.accept(ordinal, Verdict { score, best_effort: true });
            }
        }

        if rejected {
            Ok(PhaseEvent::ResultsRejected)
        } else {
            Ok(PhaseEvent::ResultsAccepted)
        }
    }

    async fn synthesize(&self, state: &mut WorkflowState) -> Result<PhaseEvent> {
        let results = state.accepted_results();
        let request = SynthesisRequest {
            query: state.query().clone(),
            results: results.clone(),
        };
        let answer = self.steps.synthesizer.run(request).await?;

        // Any installed synthesizer is held to the grounding rule
        verify_citations(&answer, &results)?;

        state.set_answer(answer);
        Ok(PhaseEvent::AnswerReady)
    }
}
