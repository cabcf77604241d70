//! Query decomposition
//!
//! Two planners: one asks the language model for a JSON list of
//! sub-questions, the other splits the query on question boundaries
//! without any model. Both may return an empty plan, which the
//! orchestrator turns into a single sub-question.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::agent::state::StepKind;
use crate::errors::{DocError, Result};
use crate::models::ModelClient;
use crate::steps::{AgentStep, PlanRequest};
use crate::types::Query;

/// Clauses shorter than this are not worth a retrieval round
const MIN_CLAUSE_CHARS: usize = 3;

/// Planner backed by a language model
pub struct ModelPlanner {
    client: Arc<dyn ModelClient>,
}

impl ModelPlanner {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    fn build_prompt(query: &Query, max: usize) -> String {
        let mut prompt = String::from(
            "You split questions about technical documentation into independent \
             sub-questions that can each be answered by searching the documents.\n\n\
             RESPONSE FORMAT: a JSON array of strings and nothing else, for example\n\
             [\"What is X?\", \"How is X configured?\"]\n\n",
        );
        prompt.push_str(&format!(
            "Return at most {} sub-questions, in the order they should be researched. \
             Return [] if the question needs no decomposition.\n\n",
            max
        ));

        if !query.history().is_empty() {
            prompt.push_str("CONVERSATION SO FAR:\n");
            for turn in query.history() {
                prompt.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.text));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("QUESTION: {}\n", query.text()));
        prompt
    }
}

#[async_trait]
impl AgentStep for ModelPlanner {
    type Input = PlanRequest;
    type Output = Vec<String>;

    fn kind(&self) -> StepKind {
        StepKind::Planner
    }

    async fn run(&self, input: PlanRequest) -> Result<Vec<String>> {
        let prompt = Self::build_prompt(&input.query, input.max_subquestions);
        let raw = self
            .client
            .generate(&prompt)
            .await
            .map_err(|e| DocError::Planning(format!("model call failed: {}", e)))?;
        let mut plan = parse_plan(&raw)?;
        plan.truncate(input.max_subquestions);
        debug!(model = %self.client.model(), sub_questions = plan.len(), "Plan parsed");
        Ok(plan)
    }
}

/// Parse model output into sub-question texts
///
/// Accepts a bare JSON array, one wrapped in prose or code fences, and
/// arrays of `{"question": ...}` objects. Blank output is an empty plan;
/// anything else that is not a usable array is a planning error.
pub fn parse_plan(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let (start, end) = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(DocError::Planning(format!(
                "expected a JSON array of sub-questions, got: {}",
                preview(trimmed)
            )))
        }
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| DocError::Planning(format!("malformed plan: {}", e)))?;

    values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(text) => Ok(text.trim().to_string()),
            serde_json::Value::Object(map) => map
                .get("question")
                .and_then(|q| q.as_str())
                .map(|q| q.trim().to_string())
                .ok_or_else(|| DocError::Planning("plan entry without a question".to_string())),
            other => Err(DocError::Planning(format!("unusable plan entry: {}", other))),
        })
        .filter(|entry| !matches!(entry, Ok(text) if text.is_empty()))
        .collect()
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        out.push('…');
    }
    out
}

/// Model-free planner splitting on question boundaries
///
/// Clauses end at `?`, `;` or a line break. A query made of a single
/// clause yields an empty plan.
#[derive(Debug, Clone, Default)]
pub struct ClausePlanner;

impl ClausePlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn split(text: &str) -> Vec<String> {
        let mut clauses = Vec::new();
        let mut current = String::new();

        for c in text.chars() {
            match c {
                '?' => {
                    current.push(c);
                    clauses.push(std::mem::take(&mut current));
                }
                ';' | '\n' => clauses.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        clauses.push(current);

        clauses
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| c.chars().filter(|ch| ch.is_alphanumeric()).count() >= MIN_CLAUSE_CHARS)
            .collect()
    }
}

#[async_trait]
impl AgentStep for ClausePlanner {
    type Input = PlanRequest;
    type Output = Vec<String>;

    fn kind(&self) -> StepKind {
        StepKind::Planner
    }

    async fn run(&self, input: PlanRequest) -> Result<Vec<String>> {
        let mut clauses = Self::split(input.query.text());
        if clauses.len() <= 1 {
            return Ok(Vec::new());
        }
        clauses.truncate(input.max_subquestions);
        Ok(clauses)
    }
}
