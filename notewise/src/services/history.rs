use crate::llm::prompts::is_priming_content;
use crate::models::{ChatMessage, ModeSelection, Role};

/// Builds the conversation window handed to a generation call.
#[derive(Debug, Clone, Copy)]
pub struct HistoryLoader {
    turns: usize,
}

impl HistoryLoader {
    pub fn new(turns: usize) -> Self {
        Self { turns }
    }

    /// The messages of the last `turns` turns, oldest first. A turn starts at
    /// a user message and runs until the next one; anything before the first
    /// user message belongs to the oldest turn. Bypass modes drop retrieval
    /// priming before the window is taken so it cannot crowd out real turns.
    /// The caller's transcript is never modified.
    pub fn load(&self, history: &[ChatMessage], mode: &ModeSelection) -> Vec<ChatMessage> {
        let filter_priming = mode.mode.is_bypass();

        let kept: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .filter(|m| !(filter_priming && is_priming_content(&m.content)))
            .collect();

        let dropped = history.len() - kept.len();
        if dropped > 0 {
            tracing::debug!(dropped, mode = %mode, "Filtered history messages");
        }

        let turn_starts: Vec<usize> = kept
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User)
            .map(|(i, _)| i)
            .collect();
        let start = if turn_starts.len() > self.turns {
            turn_starts[turn_starts.len() - self.turns]
        } else {
            0
        };

        kept[start..].iter().map(|m| (*m).clone()).collect()
    }
}
