//! Agent steps
//!
//! The four step kinds share one capability interface, `AgentStep`. Each
//! kind fixes its own input and output types; the orchestrator holds one
//! boxed step per kind and picks them through the phase-to-step table in
//! `agent::state`.

pub mod critic;
pub mod planner;
pub mod researcher;
pub mod synthesizer;

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::state::StepKind;
use crate::agent::workflow::AcceptedResult;
use crate::errors::Result;
use crate::types::{Answer, Query, ResearchResult, SubQuestion};

pub use critic::ScoreCritic;
pub use planner::{ClausePlanner, ModelPlanner};
pub use researcher::RetrievalResearcher;
pub use synthesizer::{verify_citations, ExtractiveSynthesizer, ModelSynthesizer};

/// One unit of reasoning invoked by the orchestrator
#[async_trait]
pub trait AgentStep: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Which slot of the step table this fills
    fn kind(&self) -> StepKind;

    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Planner input: the query (history included) and the plan size cap
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub query: Query,
    pub max_subquestions: usize,
}

/// Critic input
#[derive(Debug, Clone)]
pub struct CritiqueRequest {
    pub sub_question: SubQuestion,
    pub result: ResearchResult,
}

/// Synthesizer input: accepted results in sub-question order
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub query: Query,
    pub results: Vec<AcceptedResult>,
}

pub type PlannerStep = Arc<dyn AgentStep<Input = PlanRequest, Output = Vec<String>>>;
pub type ResearcherStep = Arc<dyn AgentStep<Input = SubQuestion, Output = ResearchResult>>;
pub type CriticStep = Arc<dyn AgentStep<Input = CritiqueRequest, Output = f64>>;
pub type SynthesizerStep = Arc<dyn AgentStep<Input = SynthesisRequest, Output = Answer>>;

/// The full step table handed to the orchestrator
#[derive(Clone)]
pub struct StepSet {
    pub planner: PlannerStep,
    pub researcher: ResearcherStep,
    pub critic: CriticStep,
    pub synthesizer: SynthesizerStep,
}
