//! Deterministic steps and stores shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docbuddy::agent::{Orchestrator, StepKind, WorkflowConfig};
use docbuddy::errors::{DocError, Result};
use docbuddy::models::ModelClient;
use docbuddy::rag::{Retriever, SearchParams};
use docbuddy::steps::{
    AgentStep, CritiqueRequest, ExtractiveSynthesizer, PlanRequest, RetrievalResearcher,
    ScoreCritic, StepSet, SynthesisRequest,
};
use docbuddy::types::{Answer, Chunk, Citation, Span};

/// Chunk whose span covers its whole text
pub fn chunk(document_id: &str, index: usize, text: &str, score: f32) -> Chunk {
    Chunk::new(document_id, index, Span::new(0, text.chars().count()), text, vec![]).scored(score)
}

/// Workflow options for tests: no backoff, small budgets
pub fn test_config() -> WorkflowConfig {
    WorkflowConfig {
        top_k: 3,
        min_score: 0.0,
        max_subquestions: 4,
        max_retries_per_subquestion: 2,
        critique_threshold: 0.5,
        max_parallel_research: 4,
        min_supporting_chunks: 1,
        retry_backoff_ms: 0,
    }
}

/// Planner returning a fixed plan
pub struct ScriptedPlanner {
    plan: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn new(plan: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            plan: plan.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AgentStep for ScriptedPlanner {
    type Input = PlanRequest;
    type Output = Vec<String>;

    fn kind(&self) -> StepKind {
        StepKind::Planner
    }

    async fn run(&self, _input: PlanRequest) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.plan.clone())
    }
}

/// Planner that always fails
pub struct BrokenPlanner;

#[async_trait]
impl AgentStep for BrokenPlanner {
    type Input = PlanRequest;
    type Output = Vec<String>;

    fn kind(&self) -> StepKind {
        StepKind::Planner
    }

    async fn run(&self, _input: PlanRequest) -> Result<Vec<String>> {
        Err(DocError::Planning("model answered in prose".to_string()))
    }
}

/// Model server that refuses every connection
pub struct UnreachableModel;

#[async_trait]
impl ModelClient for UnreachableModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(DocError::Model("connection refused".to_string()))
    }

    fn model(&self) -> &str {
        "unreachable"
    }
}

/// Corpus store with scripted answers
///
/// Each query text can have a queue of responses; once the queue is empty
/// (or for unknown texts) the default chunks are returned. The first
/// `fail_first` calls fail with a retrieval error.
pub struct ScriptedRetriever {
    default: Vec<Chunk>,
    by_query: Mutex<HashMap<String, VecDeque<Vec<Chunk>>>>,
    fail_first: usize,
    delay: Duration,
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedRetriever {
    pub fn new(default: Vec<Chunk>) -> Self {
        Self {
            default,
            by_query: Mutex::new(HashMap::new()),
            fail_first: 0,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Store that is never reachable
    pub fn unreachable() -> Self {
        Self::new(Vec::new()).failing_first(usize::MAX)
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(self, text: &str, responses: Vec<Vec<Chunk>>) -> Self {
        self.by_query
            .lock()
            .unwrap()
            .insert(text.to_string(), responses.into_iter().collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn query(&self, text: &str, k: usize, min_score: f32) -> Result<Vec<Chunk>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(DocError::Retrieval("corpus store unreachable".to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .by_query
            .lock()
            .unwrap()
            .get_mut(text)
            .and_then(|queue| queue.pop_front());
        let mut chunks: Vec<Chunk> = scripted
            .unwrap_or_else(|| self.default.clone())
            .into_iter()
            .filter(|c| c.score() >= min_score)
            .collect();
        chunks.truncate(k);

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(chunks)
    }
}

/// Critic returning the same score for everything
pub struct FixedCritic(pub f64);

#[async_trait]
impl AgentStep for FixedCritic {
    type Input = CritiqueRequest;
    type Output = f64;

    fn kind(&self) -> StepKind {
        StepKind::Critic
    }

    async fn run(&self, _input: CritiqueRequest) -> Result<f64> {
        Ok(self.0)
    }
}

/// Synthesizer that cites a chunk nobody retrieved
pub struct FabricatingSynthesizer;

#[async_trait]
impl AgentStep for FabricatingSynthesizer {
    type Input = SynthesisRequest;
    type Output = Answer;

    fn kind(&self) -> StepKind {
        StepKind::Synthesizer
    }

    async fn run(&self, _input: SynthesisRequest) -> Result<Answer> {
        Ok(Answer::new(
            "It is 7, trust me",
            vec![Citation {
                document_id: "nowhere".to_string(),
                chunk_id: "nowhere_0".to_string(),
                span: Span::new(0, 5),
            }],
            1.0,
        ))
    }
}

/// Standard step table over a retriever
pub fn steps_with(
    planner: Arc<dyn AgentStep<Input = PlanRequest, Output = Vec<String>>>,
    retriever: Arc<ScriptedRetriever>,
    config: &WorkflowConfig,
) -> StepSet {
    StepSet {
        planner,
        researcher: Arc::new(RetrievalResearcher::new(
            retriever,
            SearchParams {
                top_k: config.top_k,
                min_score: config.min_score,
            },
        )),
        critic: Arc::new(ScoreCritic::new(config.min_supporting_chunks)),
        synthesizer: Arc::new(ExtractiveSynthesizer::new()),
    }
}

pub fn orchestrator(steps: StepSet, config: WorkflowConfig) -> Orchestrator {
    Orchestrator::new(steps, config).expect("valid orchestrator")
}
