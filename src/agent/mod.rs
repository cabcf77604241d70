//! Agent orchestration module
//!
//! Core workflow components: phase machine, per-query state and the
//! orchestrator that drives them.

pub mod orchestrator;
pub mod state;
pub mod workflow;

// Re-export commonly used types
pub use orchestrator::{Failure, Orchestrator, WorkflowConfig, WorkflowRun};
pub use state::{PhaseEvent, StepKind, WorkflowPhase};
pub use workflow::{AcceptedResult, PhaseTransition, Verdict, WorkflowState};
