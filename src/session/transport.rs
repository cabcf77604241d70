// Query submission wire types
//
// Requests and responses are plain JSON with camelCase keys. A response is
// either an answer or a structured failure, never both.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{Failure, Orchestrator, WorkflowPhase};
use crate::errors::DocError;
use crate::types::{Answer, Query, Span, Turn};

/// Incoming question with the conversation so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Stamp the request as a fresh query
    pub fn into_query(self) -> Query {
        Query::with_history(self.text, self.history)
    }
}

/// Citation as seen by callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationPayload {
    pub document_id: String,
    pub span: Span,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub answer: String,
    pub citations: Vec<CitationPayload>,
    pub confidence: f64,
}

/// Failure response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    pub step_failed: WorkflowPhase,
    pub cause: String,
    pub detail: String,
}

/// Response to a query submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Answer(AnswerPayload),
    Failure(FailurePayload),
}

impl QueryResponse {
    pub fn is_answer(&self) -> bool {
        matches!(self, QueryResponse::Answer(_))
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&Answer> for AnswerPayload {
    fn from(answer: &Answer) -> Self {
        Self {
            answer: answer.text().to_string(),
            citations: answer
                .citations()
                .iter()
                .map(|c| CitationPayload {
                    document_id: c.document_id.clone(),
                    span: c.span,
                })
                .collect(),
            confidence: answer.confidence(),
        }
    }
}

impl From<&Failure> for FailurePayload {
    fn from(failure: &Failure) -> Self {
        Self {
            step_failed: failure.step,
            cause: failure.cause().to_string(),
            detail: failure.error.to_string(),
        }
    }
}

impl From<std::result::Result<Answer, Failure>> for QueryResponse {
    fn from(outcome: std::result::Result<Answer, Failure>) -> Self {
        match outcome {
            Ok(answer) => QueryResponse::Answer(AnswerPayload::from(&answer)),
            Err(failure) => QueryResponse::Failure(FailurePayload::from(&failure)),
        }
    }
}

/// Answer one request
///
/// Stateless: everything the run needs travels in the request.
pub async fn handle(orchestrator: &Orchestrator, request: QueryRequest) -> QueryResponse {
    handle_with_cancel(orchestrator, request, CancellationToken::new()).await
}

/// Answer one request, giving up when `cancel` fires
pub async fn handle_with_cancel(
    orchestrator: &Orchestrator,
    request: QueryRequest,
    cancel: CancellationToken,
) -> QueryResponse {
    if request.text.trim().is_empty() {
        return QueryResponse::Failure(FailurePayload::from(&Failure {
            step: WorkflowPhase::Planning,
            error: DocError::Planning("query text is empty".to_string()),
        }));
    }

    orchestrator
        .execute(request.into_query(), cancel)
        .await
        .outcome
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Citation;

    #[test]
    fn test_request_accepts_missing_history() {
        let request: QueryRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(request.text, "hi");
        assert!(request.history.is_empty());

        let request: QueryRequest = serde_json::from_str(
            r#"{"text": "and then?", "history": [{"role": "user", "text": "hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.history, vec![Turn::user("hi")]);
    }

    #[test]
    fn test_answer_wire_shape() {
        let answer = Answer::new(
            "maxRetries defaults to 2 [guide]",
            vec![Citation {
                document_id: "guide".to_string(),
                chunk_id: "guide_0".to_string(),
                span: Span::new(0, 24),
            }],
            0.9,
        );
        let response = QueryResponse::from(Ok(answer));
        let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();

        assert_eq!(json["answer"], "maxRetries defaults to 2 [guide]");
        assert_eq!(json["citations"][0]["documentId"], "guide");
        assert_eq!(json["citations"][0]["span"]["end"], 24);
        assert!(json.get("stepFailed").is_none());
    }

    #[test]
    fn test_failure_wire_shape() {
        let failure = Failure {
            step: WorkflowPhase::Researching,
            error: DocError::Retrieval("connection refused".to_string()),
        };
        let response = QueryResponse::from(Err(failure));
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();

        assert_eq!(json["stepFailed"], "RESEARCHING");
        assert_eq!(json["cause"], "RetrievalError");
        assert!(json["detail"].as_str().unwrap().contains("connection refused"));
        assert!(!response.is_answer());
    }

    #[test]
    fn test_response_round_trips_untagged() {
        let failure = QueryResponse::Failure(FailurePayload {
            step_failed: WorkflowPhase::Planning,
            cause: "Cancelled".to_string(),
            detail: "Run cancelled".to_string(),
        });
        let json = serde_json::to_string(&failure).unwrap();
        let back: QueryResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
    }
}
