//! Query and conversation types
//!
//! A `Query` is the immutable input of one orchestration run. The
//! conversation history travels with it untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One prior turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// User question plus the context it was asked in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    history: Vec<Turn>,
    request_id: Uuid,
    received_at: DateTime<Utc>,
}

impl Query {
    /// Create a query with a fresh request id and no history
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_history(text, Vec::new())
    }

    /// Create a query carrying prior conversation turns
    pub fn with_history(text: impl Into<String>, history: Vec<Turn>) -> Self {
        Self {
            text: text.into(),
            history,
            request_id: Uuid::new_v4(),
            received_at: Utc::now(),
        }
    }

    /// Pin the request id (replays and tests)
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
