// Session and transport layer
//
// Turns user requests into orchestrator runs:
// - Transport: JSON request/response types and a stateless handler
// - Chat: a session that remembers the conversation between questions

pub mod chat;
pub mod transport;

// Re-export key types
pub use chat::Session;
pub use transport::{
    handle, handle_with_cancel, AnswerPayload, CitationPayload, FailurePayload, QueryRequest,
    QueryResponse,
};
