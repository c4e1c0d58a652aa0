use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use uuid::Uuid;

use crate::models::{ParsedReference, ReferenceKind};

/// Inline tag introducing a note reference, e.g. `@note:"Q3 Budget"`.
pub const REFERENCE_TAG: &str = "@note:";

static QUOTED_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)@note:"([^"]+)""#).expect("valid quoted tag regex"));

static UNQUOTED_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)@note:([^\s"\[\]]+)"#).expect("valid tag regex"));

static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid wiki link regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceParse {
    pub references: Vec<ParsedReference>,
    pub clean_text: String,
}

/// Extract explicit note references and return the text without them.
///
/// Quoted tags are consumed first so the unquoted pattern never re-reads a
/// quoted title, then bare tags, then `[[wiki links]]`. Each match is cut at
/// the position it was found, so repeated spans are each removed once, and
/// whitespace is collapsed.
pub fn parse_references(text: &str) -> ReferenceParse {
    let mut references = Vec::new();

    let (working, quoted) = cut_matches(text, &QUOTED_TAG_RE, |caps| {
        let whole = caps.get(0)?;
        let value = caps[1].trim();
        (!value.is_empty()).then(|| (whole.range(), value.to_string()))
    });
    references.extend(quoted.into_iter().map(|(span, value)| ParsedReference {
        kind: ReferenceKind::QuotedTitle,
        value,
        matched_span: span,
    }));

    let (working, unquoted) = cut_matches(&working, &UNQUOTED_TAG_RE, |caps| {
        let whole = caps.get(0)?;
        let token = caps.get(1)?;
        let value = token.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        (!value.is_empty()).then(|| (whole.start()..token.start() + value.len(), value.to_string()))
    });
    references.extend(unquoted.into_iter().map(|(span, value)| {
        let kind = if Uuid::try_parse(&value).is_ok() {
            ReferenceKind::ExactId
        } else {
            ReferenceKind::FreeText
        };
        ParsedReference {
            kind,
            value,
            matched_span: span,
        }
    }));

    let (working, links) = cut_matches(&working, &WIKI_LINK_RE, |caps| {
        let whole = caps.get(0)?;
        let value = caps[1].trim();
        (!value.is_empty()).then(|| (whole.range(), value.to_string()))
    });
    references.extend(links.into_iter().map(|(span, value)| ParsedReference {
        kind: ReferenceKind::QuotedTitle,
        value,
        matched_span: span,
    }));

    ReferenceParse {
        references,
        clean_text: working.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Find every match `extract` accepts and cut it out of `text` at its own
/// location. Returns the remaining text and `(span, value)` pairs in text
/// order.
fn cut_matches<F>(text: &str, re: &Regex, extract: F) -> (String, Vec<(String, String)>)
where
    F: Fn(&Captures<'_>) -> Option<(Range<usize>, String)>,
{
    let found: Vec<(Range<usize>, String)> = re
        .captures_iter(text)
        .filter_map(|caps| extract(&caps))
        .collect();

    let mut remaining = text.to_string();
    for (range, _) in found.iter().rev() {
        remaining.replace_range(range.clone(), " ");
    }

    let matches = found
        .into_iter()
        .map(|(range, value)| (text[range].to_string(), value))
        .collect();
    (remaining, matches)
}
