//! Prompt templates and canned replies.
//!
//! Templates use plain `format!()` interpolation so a missing variable is a
//! compile-time error.

use crate::models::{ChatMode, Document, ModeSelection, ResolvedReference};

/// First system message of every retrieval-grounded generation.
pub const RAG_SYSTEM_SEED: &str = "You are Notewise, an assistant that answers questions using the user's own notes. \
Ground every statement in the notes provided in the context block. If the notes do not contain \
the answer, say so plainly instead of guessing.";

/// Marker opening the note context block injected into RAG generations.
pub const NOTE_CONTEXT_HEADER: &str = "[NOTE CONTEXT]";

/// Substrings that only ever occur in internal priming content.
pub const PRIMING_FINGERPRINTS: &[&str] = &[
    NOTE_CONTEXT_HEADER,
    "[END NOTE CONTEXT]",
    "You are Notewise, an assistant that answers questions using the user's own notes",
    "Ground every statement in the notes provided",
    "Answer using only the notes above",
];

/// Whether a stored message is retrieval priming rather than conversation.
pub fn is_priming_content(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed == RAG_SYSTEM_SEED || PRIMING_FINGERPRINTS.iter().any(|f| trimmed.contains(f))
}

/// Render the notes that ground an answer.
///
/// # Example
/// ```
/// use notewise::llm::prompts::{note_context_block, NOTE_CONTEXT_HEADER};
/// use notewise::models::Document;
///
/// let doc = Document {
///     id: "n1".to_string(),
///     title: "Rent".to_string(),
///     plain_content: "Rent is 1200 per month".to_string(),
///     notebook: None,
///     relevance_score: None,
/// };
/// let block = note_context_block(&[&doc]);
/// assert!(block.starts_with(NOTE_CONTEXT_HEADER));
/// assert!(block.contains("Rent is 1200"));
/// ```
pub fn note_context_block(documents: &[&Document]) -> String {
    let notes = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let notebook = doc
                .notebook
                .as_deref()
                .map(|nb| format!(" (notebook: {nb})"))
                .unwrap_or_default();
            format!("## Note {}: {}{}\n{}", i + 1, doc.title, notebook, doc.plain_content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{NOTE_CONTEXT_HEADER}\n{notes}\n[END NOTE CONTEXT]\nAnswer using only the notes above.")
}

/// Notes the user pointed at, rendered for a bypass conversation. Carries
/// none of the retrieval priming so bypass history stays clean.
pub fn shared_notes_message(documents: &[Document]) -> String {
    let notes = documents
        .iter()
        .map(|doc| format!("\"{}\":\n{}", doc.title, doc.plain_content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("The user shared these notes for this message:\n\n{notes}")
}

/// Planner inputs rendered to text by the caller.
pub struct PlannerPromptParts<'a> {
    pub narrative: &'a str,
    pub candidates: &'a str,
    pub focus: &'a str,
    pub state: &'a str,
    pub query: &'a str,
    pub hint: Option<&'a str>,
}

/// Generate the intent classification prompt.
pub fn intent_planner_prompt(parts: &PlannerPromptParts<'_>) -> String {
    let PlannerPromptParts {
        narrative,
        candidates,
        focus,
        state,
        query,
        hint,
    } = parts;
    let hint = match hint {
        Some(h) => format!("\nNote: {h}\n"),
        None => String::new(),
    };

    format!(
        r#"You route turns in a conversation about the user's notes. Decide what the latest message needs.

Actions:
- SEARCH: the user asks about something the current candidates do not cover. Provide "search_query".
- SELECT: the user picks one candidate. Provide "target_index".
- SWITCH: a note is already focused and the user moves to another candidate. Provide "target_index".
- ANSWER_CURRENT: the user asks a follow-up about the focused note.
- ANSWER_ALL: the question needs every candidate, e.g. totals, comparisons, summaries across notes.
- CLARIFY: the message is too vague to act on.

Recent conversation:
{narrative}

Candidates (indices start at 0; the user sees the same list numbered from 1):
{candidates}

Current focus: {focus}
State: {state}
{hint}
Examples:
- Candidates are three budget notes and the user says "the second one" -> {{"action": "SELECT", "target_index": 1}}
- Candidates are five finance notes and the user asks "what's my total?" -> {{"action": "ANSWER_ALL"}}
- A note is focused and the user asks "when is it due?" -> {{"action": "ANSWER_CURRENT"}}
- A note is focused and the user says "now show me the travel one" -> {{"action": "SWITCH", "target_index": <index of the travel note>}}
- The user asks "what did I write about onboarding?" and no candidate matches -> {{"action": "SEARCH", "search_query": "onboarding"}}

Latest message: {query}

Respond with JSON only:
{{"action": "...", "search_query": null, "target_index": null, "reasoning": "one short sentence"}}"#
    )
}

/// Short explanation returned when a mode directive carries no text.
pub fn usage_hint(mode: &ModeSelection) -> String {
    let style = mode
        .style_key
        .as_deref()
        .map(|key| format!(" using the '{key}' style"))
        .unwrap_or_default();

    match mode.mode {
        ChatMode::Bypass | ChatMode::BypassStyle => format!(
            "Bypass mode{style}: I answer directly without looking at your notes. \
             Type your question after the command, e.g. `/bypass explain recursion`."
        ),
        ChatMode::Rag | ChatMode::RagStyle => format!(
            "Notes mode{style}: I search your notes and answer from them. Ask a question, \
             mention a note with @note:\"Title\" or [[Title]], or filter with /notebook <name>."
        ),
    }
}

/// Numbered option list shown when the user has to pick a note.
pub fn clarify_reply(candidates: &[Document]) -> String {
    if candidates.is_empty() {
        return "Could you tell me a bit more about what you are looking for? \
                A title, notebook or keyword helps me find the right note."
            .to_string();
    }

    let options = candidates
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("{}. {}", i + 1, doc.title))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "I found several notes that could match. Which one do you mean?\n{options}\n\
         You can also ask about all of them at once."
    )
}

pub fn no_results_reply(query: &str) -> String {
    format!("I couldn't find any notes matching \"{query}\". Try different keywords or a notebook filter.")
}

pub const SEARCH_UNAVAILABLE_REPLY: &str =
    "I couldn't search your notes just now. Please try again in a moment.";

/// Instruction used when notes are attached without a question.
pub const ATTACHED_NOTES_QUESTION: &str = "Summarize the referenced notes.";

pub fn references_not_found_reply(references: &[ResolvedReference]) -> String {
    let missing = references
        .iter()
        .filter(|r| !r.found)
        .map(|r| format!("- {}", r.requested))
        .collect::<Vec<_>>()
        .join("\n");

    format!("I couldn't find these notes:\n{missing}")
}
