// Conversation session: history carried across turns
use std::sync::Arc;

use tracing::debug;

use crate::agent::Orchestrator;
use crate::session::transport::{handle, QueryRequest, QueryResponse};
use crate::types::Turn;

/// Default number of turns kept (user and assistant turns count separately)
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Interactive session over one orchestrator
///
/// Only answered exchanges enter the history; a failed question leaves it
/// untouched so the user can rephrase.
pub struct Session {
    orchestrator: Arc<Orchestrator>,
    history: Vec<Turn>,
    max_history: usize,
}

impl Session {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self::with_max_history(orchestrator, DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(orchestrator: Arc<Orchestrator>, max_history: usize) -> Self {
        Self {
            orchestrator,
            history: Vec::new(),
            max_history,
        }
    }

    /// Ask a question in the context of the conversation so far
    pub async fn ask(&mut self, text: &str) -> QueryResponse {
        let request = QueryRequest::new(text).with_history(self.history.clone());
        let response = handle(&self.orchestrator, request).await;

        if let QueryResponse::Answer(payload) = &response {
            self.history.push(Turn::user(text));
            self.history.push(Turn::assistant(payload.answer.clone()));
            self.trim();
        }

        debug!(history = self.history.len(), "Session turn complete");
        response
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn trim(&mut self) {
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }
}
