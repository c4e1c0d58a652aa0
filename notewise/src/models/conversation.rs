use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ActionKind, ModeSelection, ResolvedReference, SearchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A note that grounded a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationRef {
    pub note_id: String,
    pub title: String,
    pub relevance_score: Option<f32>,
}

/// Everything the request layer needs after one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub reply: String,
    pub citations: Vec<CitationRef>,
    pub mode: ModeSelection,
    /// Mode string to persist for the conversation, `None` when not sticky.
    pub sticky_mode: Option<String>,
    pub resolved_references: Vec<ResolvedReference>,
    pub action: Option<ActionKind>,
    pub strategy: Option<SearchStrategy>,
}

impl ExecutionResult {
    pub fn reply(reply: impl Into<String>, mode: ModeSelection) -> Self {
        Self {
            reply: reply.into(),
            citations: Vec::new(),
            mode,
            sticky_mode: None,
            resolved_references: Vec::new(),
            action: None,
            strategy: None,
        }
    }
}

/// Input of a single turn.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[validate(length(min = 1, message = "user id cannot be empty"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "session id cannot be empty"))]
    pub session_id: String,
    #[validate(length(max = 16000, message = "message is too long"))]
    pub text: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Sticky mode persisted by the caller for this conversation.
    #[serde(default)]
    pub session_mode: Option<String>,
    /// References already resolved by the caller, e.g. notes attached in the UI.
    #[serde(default)]
    #[validate(length(max = 5, message = "at most 5 notes can be attached"))]
    pub attached_references: Vec<ResolvedReference>,
}

impl TurnRequest {
    pub fn new(user_id: &str, session_id: &str, text: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_session_mode(mut self, mode: impl Into<String>) -> Self {
        self.session_mode = Some(mode.into());
        self
    }

    pub fn with_attached(mut self, references: Vec<ResolvedReference>) -> Self {
        self.attached_references = references;
        self
    }
}
