//! Workflow phase machine
//!
//! Deterministic finite state machine driving one orchestration run:
//! - Safety: no transition outside the table below
//! - Liveness: every run ends in Done or Failed
//! - Determinism: unique next phase per (phase, event)

use crate::errors::{DocError, Result};
use serde::{Deserialize, Serialize};

/// Orchestration phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    /// Decomposing the query into sub-questions
    Planning,

    /// Retrieving context for pending sub-questions
    Researching,

    /// Scoring retrieved context
    Critiquing,

    /// Writing the grounded answer
    Synthesizing,

    /// Answer produced (terminal)
    Done,

    /// Run aborted (terminal)
    Failed,
}

/// Events that move the workflow between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Planner returned (possibly degenerate) sub-questions
    PlanReady,

    /// Some sub-questions still lack a result after a research round
    ResearchIncomplete,

    /// Every sub-question has a research result
    ResearchComplete,

    /// Critic rejected at least one result with retries left
    ResultsRejected,

    /// Every result was accepted
    ResultsAccepted,

    /// Synthesizer produced an answer
    AnswerReady,

    /// A step failed without recovery
    StepFailed,

    /// Caller cancelled the run
    Cancelled,
}

/// The closed set of agent steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Planner,
    Researcher,
    Critic,
    Synthesizer,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Planner => "planner",
            StepKind::Researcher => "researcher",
            StepKind::Critic => "critic",
            StepKind::Synthesizer => "synthesizer",
        }
    }
}

impl WorkflowPhase {
    /// Check if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Done | WorkflowPhase::Failed)
    }

    /// Phase-to-step table
    pub fn step(&self) -> Option<StepKind> {
        match self {
            WorkflowPhase::Planning => Some(StepKind::Planner),
            WorkflowPhase::Researching => Some(StepKind::Researcher),
            WorkflowPhase::Critiquing => Some(StepKind::Critic),
            WorkflowPhase::Synthesizing => Some(StepKind::Synthesizer),
            WorkflowPhase::Done | WorkflowPhase::Failed => None,
        }
    }

    /// Attempt a transition
    ///
    /// Valid transitions:
    /// 1. Planning     → Researching  (PlanReady)
    /// 2. Researching  → Researching  (ResearchIncomplete)
    /// 3. Researching  → Critiquing   (ResearchComplete)
    /// 4. Critiquing   → Researching  (ResultsRejected)
    /// 5. Critiquing   → Synthesizing (ResultsAccepted)
    /// 6. Synthesizing → Done         (AnswerReady)
    /// 7. non-terminal → Failed       (StepFailed | Cancelled)
    ///
    /// Terminal phases accept no events.
    pub fn transition(&self, event: PhaseEvent) -> Result<WorkflowPhase> {
        use PhaseEvent::*;
        use WorkflowPhase::*;

        let next = match (self, event) {
            (Planning, PlanReady) => Researching,
            (Researching, ResearchIncomplete) => Researching,
            (Researching, ResearchComplete) => Critiquing,
            (Critiquing, ResultsRejected) => Researching,
            (Critiquing, ResultsAccepted) => Synthesizing,
            (Synthesizing, AnswerReady) => Done,
            (from, StepFailed | Cancelled) if !from.is_terminal() => Failed,
            (from, event) => {
                return Err(DocError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Get all valid events from this phase
    pub fn valid_events(&self) -> Vec<PhaseEvent> {
        use PhaseEvent::*;
        use WorkflowPhase::*;

        match self {
            Planning => vec![PlanReady, StepFailed, Cancelled],
            Researching => vec![ResearchIncomplete, ResearchComplete, StepFailed, Cancelled],
            Critiquing => vec![ResultsRejected, ResultsAccepted, StepFailed, Cancelled],
            Synthesizing => vec![AnswerReady, StepFailed, Cancelled],
            Done | Failed => vec![],
        }
    }

    /// Human-readable phase name
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkflowPhase::Planning => "Planning",
            WorkflowPhase::Researching => "Researching",
            WorkflowPhase::Critiquing => "Critiquing",
            WorkflowPhase::Synthesizing => "Synthesizing",
            WorkflowPhase::Done => "Done",
            WorkflowPhase::Failed => "Failed",
        }
    }

    /// Wire name, matching the serde representation
    pub fn wire_name(&self) -> &'static str {
        match self {
            WorkflowPhase::Planning => "PLANNING",
            WorkflowPhase::Researching => "RESEARCHING",
            WorkflowPhase::Critiquing => "CRITIQUING",
            WorkflowPhase::Synthesizing => "SYNTHESIZING",
            WorkflowPhase::Done => "DONE",
            WorkflowPhase::Failed => "FAILED",
        }
    }
}
