use serde::{Deserialize, Serialize};

use super::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Substring/keyword match against title and body.
    Literal,
    /// Embedding similarity over note chunks.
    Semantic,
    /// Slash-style filter, literal match inside the restriction.
    Filtered,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal => write!(f, "literal"),
            Self::Semantic => write!(f, "semantic"),
            Self::Filtered => write!(f, "filtered"),
        }
    }
}

/// Structural restrictions on a retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFilters {
    pub notebook: Option<String>,
    pub title: Option<String>,
}

impl RetrievalFilters {
    pub fn is_empty(&self) -> bool {
        self.notebook.is_none() && self.title.is_none()
    }

    /// Fields set on `other` win.
    pub fn merged_with(&self, other: &RetrievalFilters) -> RetrievalFilters {
        RetrievalFilters {
            notebook: other.notebook.clone().or_else(|| self.notebook.clone()),
            title: other.title.clone().or_else(|| self.title.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    NearDuplicateTitles,
    GenericTitles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    /// Rank order, most relevant first.
    pub documents: Vec<Document>,
    pub strategy: SearchStrategy,
    pub ambiguous: bool,
    pub ambiguity_reason: Option<AmbiguityReason>,
}

impl RetrievalOutcome {
    pub fn empty(strategy: SearchStrategy) -> Self {
        Self {
            documents: Vec::new(),
            strategy,
            ambiguous: false,
            ambiguity_reason: None,
        }
    }
}
