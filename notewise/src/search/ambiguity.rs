use std::collections::HashSet;

use crate::models::{AmbiguityReason, Document};

/// Word overlap at or above which two titles count as near-duplicates.
pub const NEAR_DUPLICATE_OVERLAP: f64 = 0.6;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "what", "which", "who", "how", "when", "where", "why",
    "did", "does", "about", "with", "from", "that", "this", "these", "those", "have", "has",
    "had", "you", "your", "my", "mine", "our", "all", "any", "can", "could", "would", "should",
    "tell", "show", "give", "write", "wrote", "written", "note", "notes", "there", "their",
    "into", "over", "is", "me", "in", "on", "of", "to", "it", "an", "or", "do", "i",
];

/// Lowercased title words with digits and punctuation removed.
pub fn normalize_title(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of two normalized titles. Two titles that normalize to
/// nothing (e.g. "2023" and "2024") are identical for this purpose.
pub fn title_overlap_score(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = normalize_title(a).into_iter().collect();
    let words_b: HashSet<String> = normalize_title(b).into_iter().collect();

    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    intersection as f64 / union as f64
}

fn query_keywords(query: &str) -> Vec<String> {
    normalize_title(query)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Prefix match of at least 3 chars covers plurals and verb forms.
fn keyword_matches(keyword: &str, word: &str) -> bool {
    keyword == word
        || (keyword.len().min(word.len()) >= 3
            && (keyword.starts_with(word) || word.starts_with(keyword)))
}

/// Decide whether a result set is too similar or generic to pick one note.
///
/// Sets smaller than `multi_doc_threshold` are never ambiguous.
pub fn classify_ambiguity(
    query: &str,
    documents: &[Document],
    multi_doc_threshold: usize,
) -> Option<AmbiguityReason> {
    if documents.len() < multi_doc_threshold.max(2) {
        return None;
    }

    let near_duplicates = documents.iter().enumerate().any(|(i, a)| {
        documents[i + 1..]
            .iter()
            .any(|b| title_overlap_score(&a.title, &b.title) >= NEAR_DUPLICATE_OVERLAP)
    });
    if near_duplicates {
        return Some(AmbiguityReason::NearDuplicateTitles);
    }

    let keywords = query_keywords(query);
    if keywords.is_empty() {
        return Some(AmbiguityReason::GenericTitles);
    }

    let scores: Vec<usize> = documents
        .iter()
        .map(|doc| {
            let words = normalize_title(&doc.title);
            keywords
                .iter()
                .filter(|k| words.iter().any(|w| keyword_matches(k, w)))
                .count()
        })
        .collect();

    let top = scores.iter().copied().max().unwrap_or(0);
    let tied = scores.iter().filter(|s| **s == top).count();

    (tied >= 2).then_some(AmbiguityReason::GenericTitles)
}
