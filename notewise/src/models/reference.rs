use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    ExactId,
    QuotedTitle,
    FreeText,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactId => write!(f, "exact_id"),
            Self::QuotedTitle => write!(f, "quoted_title"),
            Self::FreeText => write!(f, "free_text"),
        }
    }
}

/// One explicit note mention found in user text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReference {
    pub kind: ReferenceKind,
    pub value: String,
    /// Exact text that was cut out of the utterance.
    pub matched_span: String,
}

/// Outcome of looking up a reference against the note store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    pub note_id: Option<String>,
    pub title: String,
    pub plain_content: String,
    pub found: bool,
    pub error_reason: Option<String>,
    /// What the user asked for, kept for not-found messages.
    pub requested: String,
}

impl ResolvedReference {
    pub fn found(note_id: &str, title: &str, plain_content: &str, requested: &str) -> Self {
        Self {
            note_id: Some(note_id.to_string()),
            title: title.to_string(),
            plain_content: plain_content.to_string(),
            found: true,
            error_reason: None,
            requested: requested.to_string(),
        }
    }

    pub fn missing(requested: &str, reason: impl Into<String>) -> Self {
        Self {
            note_id: None,
            title: String::new(),
            plain_content: String::new(),
            found: false,
            error_reason: Some(reason.into()),
            requested: requested.to_string(),
        }
    }
}
