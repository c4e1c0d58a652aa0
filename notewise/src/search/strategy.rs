use unicode_segmentation::UnicodeSegmentation;

use crate::models::{RetrievalFilters, SearchStrategy};

/// Queries shorter than this many graphemes are treated as exact lookups.
const MIN_SEMANTIC_GRAPHEMES: usize = 4;

const STRUCTURAL_SEPARATORS: &[char] = &['/', ':', '='];

const NOTEBOOK_FILTER: &str = "/notebook";
const TITLE_FILTER: &str = "/title";

/// A slash filter pulled out of a query, e.g. `/notebook Finance rent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralFilter {
    pub filters: RetrievalFilters,
    /// Remaining search terms, possibly empty.
    pub terms: String,
}

/// Pick literal or semantic retrieval for a query. No model call is made.
///
/// # Example
/// ```
/// use notewise::models::SearchStrategy;
/// use notewise::search::determine_strategy;
///
/// assert_eq!(determine_strategy("id:123"), SearchStrategy::Literal);
/// assert_eq!(determine_strategy("notes about onboarding"), SearchStrategy::Semantic);
/// ```
pub fn determine_strategy(query: &str) -> SearchStrategy {
    let query = query.trim();

    if query.contains(STRUCTURAL_SEPARATORS)
        || query.graphemes(true).count() < MIN_SEMANTIC_GRAPHEMES
        || is_fully_quoted(query)
    {
        SearchStrategy::Literal
    } else {
        SearchStrategy::Semantic
    }
}

fn is_fully_quoted(query: &str) -> bool {
    query.len() >= 2 && query.starts_with('"') && query.ends_with('"')
}

/// Query text with surrounding quotes removed, as used for substring matching.
pub fn literal_terms(query: &str) -> String {
    let trimmed = query.trim();
    if is_fully_quoted(trimmed) {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Recognise `/notebook <name|"quoted name"> [terms]` and `/title <exact title>`.
pub fn parse_structural_filter(query: &str) -> Option<StructuralFilter> {
    let query = query.trim();

    if let Some(rest) = strip_command(query, NOTEBOOK_FILTER) {
        let (notebook, terms) = split_name(rest)?;
        return Some(StructuralFilter {
            filters: RetrievalFilters {
                notebook: Some(notebook),
                title: None,
            },
            terms,
        });
    }

    if let Some(rest) = strip_command(query, TITLE_FILTER) {
        let title = literal_terms(rest);
        if title.is_empty() {
            return None;
        }
        return Some(StructuralFilter {
            filters: RetrievalFilters {
                notebook: None,
                title: Some(title),
            },
            terms: String::new(),
        });
    }

    None
}

fn strip_command<'a>(query: &'a str, command: &str) -> Option<&'a str> {
    let head = query.get(..command.len())?;
    if !head.eq_ignore_ascii_case(command) {
        return None;
    }
    let rest = &query[command.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Split a leading notebook name (quoted or single word) from the terms.
fn split_name(rest: &str) -> Option<(String, String)> {
    if let Some(quoted) = rest.strip_prefix('"') {
        let (name, terms) = quoted.split_once('"')?;
        let name = name.trim();
        return (!name.is_empty()).then(|| (name.to_string(), terms.trim().to_string()));
    }

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().filter(|n| !n.is_empty())?;
    let terms = parts.next().unwrap_or("").trim();
    Some((name.to_string(), terms.to_string()))
}
