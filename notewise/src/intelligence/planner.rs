use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::llm::prompts::{self, PlannerPromptParts};
use crate::llm::{ChatModel, ChatOptions};
use crate::models::{
    ActionKind, ActionPlan, ChatMessage, ConversationSession, Focus, PlanAction, Role,
    SessionState,
};

/// Messages rendered into the planner narrative.
const NARRATIVE_MESSAGES: usize = 6;
const NARRATIVE_MESSAGE_CHARS: usize = 240;

/// Raw planner output before validation.
#[derive(Debug, Deserialize)]
struct PlanResponse {
    action: String,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    target_index: Option<Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Classifies a turn into one of the six plan actions with the chat model.
pub struct IntentPlanner {
    llm: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl IntentPlanner {
    pub fn new(llm: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Never fails: provider errors, timeouts and unusable output all become
    /// CLARIFY.
    pub async fn plan(
        &self,
        session: &ConversationSession,
        query: &str,
        history: &[ChatMessage],
        hint: Option<&str>,
    ) -> ActionPlan {
        let prompt = build_prompt(session, query, history, hint);
        let options = ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(300),
            ..Default::default()
        };

        let raw = match tokio::time::timeout(self.timeout, self.llm.generate(&prompt, Some(&options)))
            .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session.id, error = %e, "Intent planner call failed");
                return ActionPlan::clarify(format!("planner unavailable: {e}"));
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session.id,
                    timeout_secs = self.timeout.as_secs(),
                    "Intent planner timed out"
                );
                return ActionPlan::clarify("planner timed out");
            }
        };

        let plan = parse_plan(&raw, session.candidates.len());
        tracing::debug!(
            session_id = %session.id,
            action = %plan.kind(),
            reasoning = %plan.reasoning,
            "Intent planned"
        );
        plan
    }
}

pub fn build_prompt(
    session: &ConversationSession,
    query: &str,
    history: &[ChatMessage],
    hint: Option<&str>,
) -> String {
    let narrative = render_narrative(history);
    let candidates = render_candidates(session);
    let focus = render_focus(session);
    let state = interpret_state(session);

    prompts::intent_planner_prompt(&PlannerPromptParts {
        narrative: &narrative,
        candidates: &candidates,
        focus: &focus,
        state,
        query,
        hint,
    })
}

fn render_narrative(history: &[ChatMessage]) -> String {
    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != Role::System && !prompts::is_priming_content(&m.content))
        .collect();

    if turns.is_empty() {
        return "(no earlier messages)".to_string();
    }

    turns[turns.len().saturating_sub(NARRATIVE_MESSAGES)..]
        .iter()
        .map(|m| format!("{}: {}", m.role, truncate_chars(m.content.trim(), NARRATIVE_MESSAGE_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn render_candidates(session: &ConversationSession) -> String {
    if session.candidates.is_empty() {
        return "(none)".to_string();
    }

    session
        .candidates
        .iter()
        .enumerate()
        .map(|(i, doc)| match &doc.notebook {
            Some(notebook) => format!("[{i}] {} (notebook: {notebook})", doc.title),
            None => format!("[{i}] {}", doc.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_focus(session: &ConversationSession) -> String {
    match &session.focused {
        None => "none".to_string(),
        Some(Focus::Aggregated) => "all candidates together".to_string(),
        Some(Focus::Note(doc)) => match session.candidates.iter().position(|c| c.id == doc.id) {
            Some(i) => format!("[{i}] {}", doc.title),
            None => doc.title.clone(),
        },
    }
}

fn interpret_state(session: &ConversationSession) -> &'static str {
    match session.state {
        SessionState::Initial => "No notes have been retrieved yet.",
        SessionState::HasCandidates => {
            "Candidate notes were found but the user has not picked one yet."
        }
        SessionState::Focused => "The conversation is centred on the focused note.",
        SessionState::Answered => {
            "An answer was given from the current focus; follow-ups usually keep that scope."
        }
    }
}

/// Strip Markdown code fences and any prose around the JSON object.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let body = rest.split_once('\n').map_or("", |(_, body)| body);
            body.trim_end().strip_suffix("```").unwrap_or(body)
        })
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced.trim(),
    }
}

fn parse_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validate raw model output into a plan. Anything malformed or pointing
/// outside the candidate list collapses to CLARIFY.
pub fn parse_plan(raw: &str, candidate_count: usize) -> ActionPlan {
    let response: PlanResponse = match serde_json::from_str(extract_json(raw)) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                error = %e,
                response_preview = %raw.chars().take(100).collect::<String>(),
                "Failed to parse planner response"
            );
            return ActionPlan::clarify(format!("planner output was not valid JSON: {e}"));
        }
    };

    let kind = match response.action.parse::<ActionKind>() {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!(action = %response.action, "Planner returned unknown action");
            return ActionPlan::clarify(e);
        }
    };
    let reasoning = response.reasoning.unwrap_or_default();

    let index = || {
        response
            .target_index
            .as_ref()
            .and_then(parse_index)
            .filter(|i| *i < candidate_count)
    };

    let action = match kind {
        ActionKind::Search => {
            match response
                .search_query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
            {
                Some(query) => PlanAction::Search {
                    query: query.to_string(),
                },
                None => return ActionPlan::clarify("SEARCH without a search query"),
            }
        }
        ActionKind::Select | ActionKind::Switch => {
            let Some(target_index) = index() else {
                tracing::warn!(
                    action = %kind,
                    target_index = ?response.target_index,
                    candidate_count,
                    "Planner target index missing or out of range"
                );
                return ActionPlan::clarify(format!(
                    "{kind} without a valid target index for {candidate_count} candidates"
                ));
            };
            if kind == ActionKind::Select {
                PlanAction::Select { target_index }
            } else {
                PlanAction::Switch { target_index }
            }
        }
        ActionKind::AnswerCurrent => PlanAction::AnswerCurrent,
        ActionKind::AnswerAll => PlanAction::AnswerAll,
        ActionKind::Clarify => PlanAction::Clarify,
    };

    ActionPlan::new(action, reasoning)
}
