use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, ModeSelection};

/// Id reported for the aggregated focus, meaning every candidate is in scope.
pub const AGGREGATED_FOCUS_ID: &str = "aggregated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Initial,
    HasCandidates,
    Focused,
    Answered,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::HasCandidates => write!(f, "has_candidates"),
            Self::Focused => write!(f, "focused"),
            Self::Answered => write!(f, "answered"),
        }
    }
}

/// What the conversation is currently centred on. A single note and the
/// aggregated set are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Focus {
    Note(Document),
    Aggregated,
}

impl Focus {
    pub fn id(&self) -> &str {
        match self {
            Focus::Note(doc) => &doc.id,
            Focus::Aggregated => AGGREGATED_FOCUS_ID,
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            Focus::Note(doc) => Some(doc),
            Focus::Aggregated => None,
        }
    }
}

/// Per-conversation retrieval state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub user_id: String,
    pub state: SessionState,
    pub candidates: Vec<Document>,
    pub focused: Option<Focus>,
    /// Mode overlay kept apart from `state`; survives retrieval transitions.
    pub sticky_mode: Option<ModeSelection>,
    pub last_query: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(id: &str, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            state: SessionState::Initial,
            candidates: Vec::new(),
            focused: None,
            sticky_mode: None,
            last_query: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn focused_document(&self) -> Option<&Document> {
        self.focused.as_ref().and_then(Focus::document)
    }

    /// Notes that ground an answer right now: the focused note alone, or every
    /// candidate when the focus is aggregated or not set yet.
    pub fn scope(&self) -> Vec<&Document> {
        match &self.focused {
            Some(Focus::Note(doc)) => vec![doc],
            Some(Focus::Aggregated) | None => self.candidates.iter().collect(),
        }
    }
}
