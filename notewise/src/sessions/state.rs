use chrono::Utc;
use thiserror::Error;

use crate::models::{ActionKind, ConversationSession, Document, Focus, PlanAction, SessionState};

/// A plan that cannot be applied to the current session. The session is left
/// untouched when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("target index {index} is out of range for {len} candidates")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{0} requires a focused note")]
    MissingFocus(ActionKind),

    #[error("{0} requires candidates")]
    NoCandidates(ActionKind),

    #[error("SEARCH results must be recorded with the retrieved documents")]
    SearchWithoutResults,
}

impl ConversationSession {
    /// Store fresh retrieval results. An empty result set returns the session
    /// to `Initial`.
    pub fn record_search(&mut self, query: &str, documents: Vec<Document>) {
        self.state = if documents.is_empty() {
            SessionState::Initial
        } else {
            SessionState::HasCandidates
        };
        self.candidates = documents;
        self.focused = None;
        self.last_query = Some(query.to_string());
        self.touch();
    }

    /// Apply a non-search plan action.
    pub fn apply(&mut self, action: &PlanAction) -> Result<(), TransitionError> {
        match action {
            PlanAction::Search { .. } => return Err(TransitionError::SearchWithoutResults),
            PlanAction::Select { target_index } => {
                let doc = self.candidate(*target_index)?;
                self.focused = Some(Focus::Note(doc));
                self.state = SessionState::Focused;
            }
            PlanAction::Switch { target_index } => {
                if self.focused.is_none() {
                    return Err(TransitionError::MissingFocus(ActionKind::Switch));
                }
                let doc = self.candidate(*target_index)?;
                self.focused = Some(Focus::Note(doc));
                self.state = SessionState::Focused;
            }
            PlanAction::AnswerCurrent => {
                if self.focused.is_none() {
                    return Err(TransitionError::MissingFocus(ActionKind::AnswerCurrent));
                }
                self.state = SessionState::Answered;
            }
            PlanAction::AnswerAll => {
                if self.candidates.is_empty() {
                    return Err(TransitionError::NoCandidates(ActionKind::AnswerAll));
                }
                self.focused = Some(Focus::Aggregated);
                self.state = SessionState::Answered;
            }
            PlanAction::Clarify => return Ok(()),
        }

        self.touch();
        Ok(())
    }

    fn candidate(&self, index: usize) -> Result<Document, TransitionError> {
        self.candidates
            .get(index)
            .cloned()
            .ok_or(TransitionError::IndexOutOfRange {
                index,
                len: self.candidates.len(),
            })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
