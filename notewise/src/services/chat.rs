use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::config::{ChatConfig, Config, ConfigSource};
use crate::db::{NoteStore, StyleRegistry};
use crate::embeddings::Embedder;
use crate::error::{ChatError, Result};
use crate::intelligence::IntentPlanner;
use crate::llm::prompts::{
    clarify_reply, no_results_reply, note_context_block, references_not_found_reply,
    shared_notes_message, usage_hint, ATTACHED_NOTES_QUESTION, RAG_SYSTEM_SEED,
    SEARCH_UNAVAILABLE_REPLY,
};
use crate::llm::{ChatModel, ChatOptions};
use crate::models::{
    ActionKind, ActionPlan, AmbiguityReason, ChatMessage, CitationRef, ConversationSession,
    Document, ExecutionResult, ModeSelection, ParsedDirective, PlanAction, ResolvedReference,
    RetrievalFilters, SearchStrategy, Style, TurnRequest,
};
use crate::processing::{parse_directive, parse_references};
use crate::services::history::HistoryLoader;
use crate::services::references::{dedupe_resolved, ReferenceResolver};
use crate::services::retrieval::RetrievalService;
use crate::sessions::SessionStore;

/// Reply and bookkeeping produced by one pipeline.
struct TurnReply {
    reply: String,
    citations: Vec<CitationRef>,
    action: Option<ActionKind>,
    strategy: Option<SearchStrategy>,
}

impl TurnReply {
    fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            citations: Vec::new(),
            action: None,
            strategy: None,
        }
    }

    fn with_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Entry point for conversation turns: routes each utterance to the
/// explicit-reference, bypass or retrieval pipeline and keeps the
/// per-conversation state.
pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    styles: Arc<dyn StyleRegistry>,
    llm: Arc<dyn ChatModel>,
    planner: IntentPlanner,
    retrieval: RetrievalService,
    resolver: ReferenceResolver,
    history: HistoryLoader,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        styles: Arc<dyn StyleRegistry>,
        sessions: Arc<dyn SessionStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        live_config: Arc<dyn ConfigSource>,
        config: &Config,
    ) -> Self {
        let planner = IntentPlanner::new(
            Arc::clone(&llm),
            Duration::from_secs(config.chat.planner_timeout_secs),
        );
        let retrieval = RetrievalService::new(
            Arc::clone(&notes),
            embedder,
            live_config,
            &config.retrieval,
        );

        Self {
            sessions,
            styles,
            llm,
            planner,
            retrieval,
            resolver: ReferenceResolver::new(notes),
            history: HistoryLoader::new(config.chat.history_turns),
            config: config.chat.clone(),
        }
    }

    /// Run one turn. Turns of the same session are serialized; the session is
    /// only updated when the turn completes, so a cancelled or failed turn
    /// leaves it as it was.
    pub async fn execute(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        request
            .validate()
            .map_err(|e| ChatError::Validation(e.to_string()))?;

        let start = Instant::now();

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            guard = self.sessions.acquire(&request.session_id, &request.user_id) => guard?,
        };

        let mut working = (*guard).clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(session_id = %request.session_id, "Turn cancelled");
                return Err(ChatError::Cancelled);
            }
            result = self.run_turn(&request, &mut working) => result,
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    session_id = %request.session_id,
                    user_id = %request.user_id,
                    error = %e,
                    "Turn failed"
                );
                return Err(e);
            }
        };

        *guard = working;

        tracing::info!(
            session_id = %request.session_id,
            user_id = %request.user_id,
            mode = %result.mode,
            action = ?result.action,
            strategy = ?result.strategy,
            citations = result.citations.len(),
            timing_ms = start.elapsed().as_millis() as u64,
            "Turn complete"
        );

        Ok(result)
    }

    /// Forget a conversation's retrieval state and sticky mode.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.delete(session_id).await;
        if removed {
            tracing::debug!(session_id, "Session ended");
        }
        removed
    }

    /// Snapshot of a conversation's state.
    pub async fn session(&self, session_id: &str) -> Option<ConversationSession> {
        self.sessions.get(session_id).await
    }

    async fn run_turn(
        &self,
        request: &TurnRequest,
        session: &mut ConversationSession,
    ) -> Result<ExecutionResult> {
        let directive = parse_directive(&request.text);
        let (requested, overrides) =
            requested_mode(&directive, request.session_mode.as_deref(), session);
        let (mode, style) = self.resolve_style(requested).await;
        self.update_sticky(session, &mode, overrides);

        // Caller-attached references replace the ones written in the text
        let parsed = parse_references(&directive.clean_text);
        let references = if !request.attached_references.is_empty() {
            self.check_reference_cap(request.attached_references.len())?;
            dedupe_resolved(request.attached_references.clone())
        } else if parsed.references.is_empty() {
            Vec::new()
        } else {
            self.check_reference_cap(parsed.references.len())?;
            self.resolver
                .resolve(&request.user_id, &parsed.references)
                .await
        };
        let text = parsed.clean_text;

        let turn = if references.iter().any(|r| r.found) {
            self.explicit_pipeline(request, &mode, style.as_ref(), &text, &references)
                .await?
        } else if text.is_empty() {
            if references.is_empty() {
                TurnReply::text(usage_hint(&mode))
            } else {
                TurnReply::text(references_not_found_reply(&references))
            }
        } else if mode.mode.is_bypass() {
            self.bypass_pipeline(request, &mode, style.as_ref(), &text)
                .await?
        } else {
            self.rag_pipeline(request, session, &mode, style.as_ref(), &text)
                .await?
        };

        Ok(ExecutionResult {
            reply: turn.reply,
            citations: turn.citations,
            mode,
            sticky_mode: session.sticky_mode.as_ref().map(ToString::to_string),
            resolved_references: references,
            action: turn.action,
            strategy: turn.strategy,
        })
    }

    /// Look up the style a mode asks for. An unknown key degrades to the
    /// unstyled mode.
    async fn resolve_style(&self, mode: ModeSelection) -> (ModeSelection, Option<Style>) {
        let Some(key) = mode.style_key.as_deref() else {
            return (mode, None);
        };

        match self.styles.get_by_key(key).await {
            Ok(Some(style)) => (mode, Some(style)),
            Ok(None) => {
                tracing::warn!(style_key = key, "Unknown style, using base mode");
                (mode.unstyled(), None)
            }
            Err(e) => {
                tracing::warn!(style_key = key, error = %e, "Style lookup failed, using base mode");
                (mode.unstyled(), None)
            }
        }
    }

    fn update_sticky(&self, session: &mut ConversationSession, mode: &ModeSelection, overrides: bool) {
        if self.config.is_sticky(mode.mode) {
            if session.sticky_mode.as_ref() != Some(mode) {
                tracing::debug!(session_id = %session.id, mode = %mode, "Sticky mode set");
            }
            session.sticky_mode = Some(mode.clone());
        } else if overrides && session.sticky_mode.take().is_some() {
            tracing::debug!(session_id = %session.id, "Sticky mode cleared");
        }
    }

    fn check_reference_cap(&self, count: usize) -> Result<()> {
        if count > self.config.max_references {
            return Err(ChatError::Validation(format!(
                "A message can reference at most {} notes, found {count}",
                self.config.max_references
            )));
        }
        Ok(())
    }

    async fn explicit_pipeline(
        &self,
        request: &TurnRequest,
        mode: &ModeSelection,
        style: Option<&Style>,
        text: &str,
        references: &[ResolvedReference],
    ) -> Result<TurnReply> {
        let documents: Vec<Document> = references.iter().filter_map(reference_document).collect();
        let question = if text.is_empty() {
            ATTACHED_NOTES_QUESTION
        } else {
            text
        };

        tracing::debug!(
            session_id = %request.session_id,
            notes = documents.len(),
            "Answering from referenced notes"
        );

        let history = self.history.load(&request.history, mode);

        // Bypass turns never see retrieval priming or return citations
        if mode.mode.is_bypass() {
            let mut messages = Vec::new();
            if let Some(style) = style {
                messages.push(ChatMessage::system(&style.system_prompt));
            }
            messages.extend(history);
            messages.push(ChatMessage::system(shared_notes_message(&documents)));
            messages.push(ChatMessage::user(question));

            let reply = self.generate(&messages, style).await?;
            return Ok(TurnReply::text(reply));
        }

        let reply = self.answer(&documents, &history, question, style).await?;

        Ok(TurnReply {
            reply,
            citations: citations(&documents),
            action: None,
            strategy: None,
        })
    }

    async fn bypass_pipeline(
        &self,
        request: &TurnRequest,
        mode: &ModeSelection,
        style: Option<&Style>,
        text: &str,
    ) -> Result<TurnReply> {
        let mut messages = Vec::new();
        if let Some(style) = style {
            messages.push(ChatMessage::system(&style.system_prompt));
        }
        messages.extend(self.history.load(&request.history, mode));
        messages.push(ChatMessage::user(text));

        let reply = self.generate(&messages, style).await?;
        Ok(TurnReply::text(reply))
    }

    async fn rag_pipeline(
        &self,
        request: &TurnRequest,
        session: &mut ConversationSession,
        mode: &ModeSelection,
        style: Option<&Style>,
        text: &str,
    ) -> Result<TurnReply> {
        let history = self.history.load(&request.history, mode);

        let plan = if session.candidates.is_empty() {
            ActionPlan::new(
                PlanAction::Search {
                    query: text.to_string(),
                },
                "no candidates to choose from",
            )
        } else {
            self.planner.plan(session, text, &history, None).await
        };

        tracing::info!(
            session_id = %session.id,
            state = %session.state,
            action = %plan.kind(),
            "Turn planned"
        );

        match plan.action {
            PlanAction::Search { query } => {
                self.search_and_answer(request, session, &query, text, &history, style)
                    .await
            }
            action => self.act(session, action, text, &history, style).await,
        }
    }

    async fn search_and_answer(
        &self,
        request: &TurnRequest,
        session: &mut ConversationSession,
        query: &str,
        question: &str,
        history: &[ChatMessage],
        style: Option<&Style>,
    ) -> Result<TurnReply> {
        let outcome = match self
            .retrieval
            .retrieve(&request.user_id, query, &RetrievalFilters::default())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_upstream() => return Err(e),
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Retrieval failed");
                return Ok(TurnReply::text(SEARCH_UNAVAILABLE_REPLY).with_action(ActionKind::Search));
            }
        };

        let strategy = outcome.strategy;
        let ambiguity = outcome.ambiguity_reason;
        session.record_search(query, outcome.documents);

        match session.candidates.len() {
            0 => Ok(TurnReply::text(no_results_reply(query))
                .with_action(ActionKind::Search)
                .with_strategy(strategy)),
            1 => {
                let reply = self
                    .act(session, PlanAction::Select { target_index: 0 }, question, history, style)
                    .await?;
                Ok(reply.with_action(ActionKind::Search).with_strategy(strategy))
            }
            _ => match ambiguity {
                Some(reason) => {
                    let plan = self
                        .planner
                        .plan(session, question, history, Some(ambiguity_hint(reason)))
                        .await;
                    let action = match plan.action {
                        PlanAction::Search { .. } => {
                            tracing::warn!(
                                session_id = %session.id,
                                "Planner asked to search again after an ambiguous search"
                            );
                            PlanAction::Clarify
                        }
                        action => action,
                    };
                    let reply = self.act(session, action, question, history, style).await?;
                    Ok(reply.with_strategy(strategy))
                }
                None => {
                    let scope = session.candidates.clone();
                    let reply = self.answer(&scope, history, question, style).await?;
                    Ok(TurnReply {
                        reply,
                        citations: citations(&scope),
                        action: Some(ActionKind::Search),
                        strategy: Some(strategy),
                    })
                }
            },
        }
    }

    /// Apply a non-search action and answer over the resulting scope. Actions
    /// that do not fit the session become a clarification.
    async fn act(
        &self,
        session: &mut ConversationSession,
        action: PlanAction,
        question: &str,
        history: &[ChatMessage],
        style: Option<&Style>,
    ) -> Result<TurnReply> {
        let kind = action.kind();
        if kind == ActionKind::Clarify {
            return Ok(clarify(session));
        }

        if let Err(e) = session.apply(&action) {
            tracing::warn!(
                session_id = %session.id,
                action = %kind,
                error = %e,
                "Plan does not fit the session, asking to clarify"
            );
            return Ok(clarify(session));
        }

        let scope: Vec<Document> = session.scope().into_iter().cloned().collect();
        let reply = self.answer(&scope, history, question, style).await?;

        Ok(TurnReply {
            reply,
            citations: citations(&scope),
            action: Some(kind),
            strategy: None,
        })
    }

    async fn answer(
        &self,
        documents: &[Document],
        history: &[ChatMessage],
        question: &str,
        style: Option<&Style>,
    ) -> Result<String> {
        let mut messages = vec![ChatMessage::system(RAG_SYSTEM_SEED)];
        if let Some(style) = style {
            messages.push(ChatMessage::system(&style.system_prompt));
        }
        messages.extend_from_slice(history);
        let context: Vec<&Document> = documents.iter().collect();
        messages.push(ChatMessage::system(note_context_block(&context)));
        messages.push(ChatMessage::user(question));

        self.generate(&messages, style).await
    }

    async fn generate(&self, messages: &[ChatMessage], style: Option<&Style>) -> Result<String> {
        let options = ChatOptions {
            model: style.and_then(|s| s.model_override.clone()),
            ..Default::default()
        };
        let timeout = Duration::from_secs(self.config.generation_timeout_secs);

        tokio::time::timeout(timeout, self.llm.chat(messages, Some(&options)))
            .await
            .map_err(|_| ChatError::Timeout("Generation".to_string()))?
    }
}

/// Mode requested for this turn and whether it came from outside the session
/// (a directive or the caller) rather than the stored sticky mode.
fn requested_mode(
    directive: &ParsedDirective,
    session_mode: Option<&str>,
    session: &ConversationSession,
) -> (ModeSelection, bool) {
    if directive.explicit {
        return (directive.selection(), true);
    }

    if let Some(raw) = session_mode.filter(|m| !m.trim().is_empty()) {
        match raw.parse::<ModeSelection>() {
            Ok(mode) => return (mode, true),
            Err(e) => tracing::warn!(session_mode = raw, error = %e, "Ignoring invalid session mode"),
        }
    }

    (session.sticky_mode.clone().unwrap_or_default(), false)
}

fn ambiguity_hint(reason: AmbiguityReason) -> &'static str {
    match reason {
        AmbiguityReason::NearDuplicateTitles => {
            "The search returned several notes with nearly identical titles. Use ANSWER_ALL if \
             the question spans them, SELECT if the message names one, otherwise CLARIFY. Do not SEARCH."
        }
        AmbiguityReason::GenericTitles => {
            "The search returned several notes and no title clearly matches the message. Use \
             ANSWER_ALL for totals, comparisons or summaries, otherwise CLARIFY. Do not SEARCH."
        }
    }
}

fn clarify(session: &ConversationSession) -> TurnReply {
    TurnReply::text(clarify_reply(&session.candidates)).with_action(ActionKind::Clarify)
}

fn reference_document(reference: &ResolvedReference) -> Option<Document> {
    if !reference.found {
        return None;
    }
    Some(Document {
        id: reference.note_id.clone()?,
        title: reference.title.clone(),
        plain_content: reference.plain_content.clone(),
        notebook: None,
        relevance_score: None,
    })
}

fn citations(documents: &[Document]) -> Vec<CitationRef> {
    documents
        .iter()
        .map(|doc| CitationRef {
            note_id: doc.id.clone(),
            title: doc.title.clone(),
            relevance_score: doc.relevance_score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMode;
    use crate::processing::parse_directive;

    #[test]
    fn test_explicit_directive_wins() {
        let mut session = ConversationSession::new("conv_1", "user_1");
        session.sticky_mode = Some(ModeSelection::new(ChatMode::Bypass, None));

        let (mode, overrides) =
            requested_mode(&parse_directive("/rag what is due"), Some("bypass"), &session);
        assert_eq!(mode, ModeSelection::rag());
        assert!(overrides);
    }

    #[test]
    fn test_caller_mode_beats_stored_sticky() {
        let mut session = ConversationSession::new("conv_1", "user_1");
        session.sticky_mode = Some(ModeSelection::new(ChatMode::Bypass, None));

        let (mode, overrides) =
            requested_mode(&parse_directive("hello"), Some("rag_style:tutor"), &session);
        assert_eq!(mode.to_string(), "rag_style:tutor");
        assert!(overrides);
    }

    #[test]
    fn test_stored_sticky_applies_to_bare_text() {
        let mut session = ConversationSession::new("conv_1", "user_1");
        session.sticky_mode = Some(ModeSelection::new(ChatMode::Bypass, None));

        let (mode, overrides) = requested_mode(&parse_directive("hello"), Some("nonsense"), &session);
        assert_eq!(mode.mode, ChatMode::Bypass);
        assert!(!overrides);

        let fresh = ConversationSession::new("conv_2", "user_1");
        assert_eq!(requested_mode(&parse_directive("hello"), None, &fresh).0, ModeSelection::rag());
    }

    #[test]
    fn test_only_found_references_become_documents() {
        let found = ResolvedReference::found("n1", "Rent", "1200", "Rent");
        let missing = ResolvedReference::missing("Travel", "note not found");
        assert_eq!(reference_document(&found).map(|d| d.id), Some("n1".to_string()));
        assert!(reference_document(&missing).is_none());
    }
}
