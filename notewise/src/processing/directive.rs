use crate::models::{ChatMode, ParsedDirective};

/// `/bypass:<style> text`, bypass with a style applied.
pub const BYPASS_STYLE_PREFIX: &str = "/bypass:";
/// `/bypass text`
pub const BYPASS_PREFIX: &str = "/bypass";
/// `/style:<style> text`, retrieval with a style applied.
pub const STYLE_PREFIX: &str = "/style:";
/// `/rag text`, explicit return to plain retrieval mode.
pub const RAG_PREFIX: &str = "/rag";

/// Split a raw utterance into mode, optional style key and the remaining text.
///
/// Prefixes are tried most specific first so `/bypass:` is never read as
/// `/bypass` followed by text. Parsing is total: anything unrecognized is
/// plain RAG text.
///
/// # Example
/// ```
/// use notewise::models::ChatMode;
/// use notewise::processing::parse_directive;
///
/// let parsed = parse_directive("/bypass:pirate tell me a joke");
/// assert_eq!(parsed.mode, ChatMode::BypassStyle);
/// assert_eq!(parsed.style_key.as_deref(), Some("pirate"));
/// assert_eq!(parsed.clean_text, "tell me a joke");
/// ```
pub fn parse_directive(raw: &str) -> ParsedDirective {
    let text = raw.trim();

    if let Some(rest) = strip_prefix_ci(text, BYPASS_STYLE_PREFIX) {
        return styled(ChatMode::BypassStyle, rest);
    }

    if let Some(rest) = strip_word_prefix_ci(text, BYPASS_PREFIX) {
        return explicit(ChatMode::Bypass, None, rest);
    }

    if let Some(rest) = strip_prefix_ci(text, STYLE_PREFIX) {
        return styled(ChatMode::RagStyle, rest);
    }

    if let Some(rest) = strip_word_prefix_ci(text, RAG_PREFIX) {
        return explicit(ChatMode::Rag, None, rest);
    }

    ParsedDirective {
        mode: ChatMode::Rag,
        style_key: None,
        clean_text: text.to_string(),
        explicit: false,
    }
}

fn styled(mode: ChatMode, rest: &str) -> ParsedDirective {
    let (key, clean) = match rest.split_once(char::is_whitespace) {
        Some((key, clean)) => (key, clean),
        None => (rest, ""),
    };

    if key.is_empty() {
        tracing::debug!(%mode, "Style directive without a key, using base mode");
        return explicit(mode.base(), None, clean);
    }

    explicit(mode, Some(key.to_string()), clean)
}

fn explicit(mode: ChatMode, style_key: Option<String>, rest: &str) -> ParsedDirective {
    ParsedDirective {
        mode,
        style_key,
        clean_text: rest.trim().to_string(),
        explicit: true,
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Like [`strip_prefix_ci`] but the prefix must be a whole word.
fn strip_word_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = strip_prefix_ci(text, prefix)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}
