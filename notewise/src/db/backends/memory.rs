use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::db::traits::{NoteStore, StyleRegistry};
use crate::error::{ChatError, Result};
use crate::models::{ChunkHit, Note, RetrievalFilters, Style};

struct StoredChunk {
    content: String,
    embedding: Vec<f32>,
}

struct StoredNote {
    note: Note,
    chunks: Vec<StoredChunk>,
}

/// Process-local note store. Suitable for the CLI and tests; a production
/// deployment puts its own persistence behind [`NoteStore`].
#[derive(Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<Vec<StoredNote>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a note together with its embedded chunks.
    pub fn upsert(&self, note: Note, chunks: Vec<(String, Vec<f32>)>) -> Result<()> {
        let mut notes = self
            .notes
            .write()
            .map_err(|e| ChatError::NoteStore(format!("Note store lock poisoned: {e}")))?;

        let stored = StoredNote {
            note,
            chunks: chunks
                .into_iter()
                .map(|(content, embedding)| StoredChunk { content, embedding })
                .collect(),
        };

        match notes.iter_mut().find(|n| n.note.id == stored.note.id) {
            Some(existing) => *existing = stored,
            None => notes.push(stored),
        }

        Ok(())
    }

    /// Insert a note without vectors; it is reachable through literal lookups
    /// only.
    pub fn insert_note(&self, note: Note) -> Result<()> {
        self.upsert(note, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.notes.read().map(|notes| notes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_owned<T>(&self, owner_id: &str, f: impl FnOnce(Vec<&StoredNote>) -> T) -> Result<T> {
        let notes = self
            .notes
            .read()
            .map_err(|e| ChatError::NoteStore(format!("Note store lock poisoned: {e}")))?;
        let owned = notes.iter().filter(|n| n.note.owner_id == owner_id).collect();
        Ok(f(owned))
    }
}

/// Rank of a literal hit; lower is better.
fn literal_rank(note: &Note, phrase: &str, keywords: &[String]) -> Option<u8> {
    let title = note.title.to_lowercase();
    let body = note.plain_content.to_lowercase();

    if title.contains(phrase) {
        return Some(0);
    }
    if body.contains(phrase) {
        return Some(1);
    }
    if !keywords.is_empty() && keywords.iter().all(|k| title.contains(k.as_str())) {
        return Some(2);
    }
    if !keywords.is_empty()
        && keywords
            .iter()
            .all(|k| title.contains(k.as_str()) || body.contains(k.as_str()))
    {
        return Some(3);
    }
    None
}

fn matches_filters(note: &Note, filters: &RetrievalFilters) -> bool {
    let notebook_ok = filters.notebook.as_ref().map_or(true, |wanted| {
        note.notebook
            .as_ref()
            .is_some_and(|nb| nb.trim().eq_ignore_ascii_case(wanted.trim()))
    });
    let title_ok = filters
        .title
        .as_ref()
        .map_or(true, |wanted| note.title.trim().eq_ignore_ascii_case(wanted.trim()));
    notebook_ok && title_ok
}

fn rank_literal(
    notes: Vec<&StoredNote>,
    terms: &str,
    filters: &RetrievalFilters,
    limit: usize,
) -> Vec<Note> {
    let phrase = terms.trim().to_lowercase();
    let keywords: Vec<String> = phrase
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect();

    let mut ranked: Vec<(u8, &Note)> = notes
        .into_iter()
        .map(|stored| &stored.note)
        .filter(|note| matches_filters(note, filters))
        .filter_map(|note| {
            if phrase.is_empty() {
                Some((0, note))
            } else {
                literal_rank(note, &phrase, &keywords).map(|rank| (rank, note))
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.updated_at.cmp(&a.1.updated_at)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, note)| note.clone())
        .collect()
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn find_by_owner_and_id(&self, owner_id: &str, note_id: &str) -> Result<Option<Note>> {
        self.read_owned(owner_id, |notes| {
            notes
                .into_iter()
                .find(|n| n.note.id == note_id)
                .map(|n| n.note.clone())
        })
    }

    async fn find_by_owner_and_exact_title(
        &self,
        owner_id: &str,
        title: &str,
    ) -> Result<Vec<Note>> {
        let filters = RetrievalFilters {
            notebook: None,
            title: Some(title.to_string()),
        };
        self.read_owned(owner_id, |notes| rank_literal(notes, "", &filters, usize::MAX))
    }

    async fn find_by_owner_fuzzy(
        &self,
        owner_id: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Note>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.read_owned(owner_id, |notes| {
            rank_literal(notes, text, &RetrievalFilters::default(), limit)
        })
    }

    async fn search_literal(
        &self,
        owner_id: &str,
        terms: &str,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<Note>> {
        self.read_owned(owner_id, |notes| rank_literal(notes, terms, filters, limit))
    }

    async fn search_similar_chunks(
        &self,
        owner_id: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkHit>> {
        self.read_owned(owner_id, |notes| {
            let mut hits: Vec<ChunkHit> = notes
                .into_iter()
                .flat_map(|stored| {
                    stored.chunks.iter().map(|chunk| ChunkHit {
                        note_id: stored.note.id.clone(),
                        chunk_content: chunk.content.clone(),
                        score: cosine_similarity(embedding, &chunk.embedding),
                    })
                })
                .filter(|hit| hit.score >= threshold)
                .collect();

            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            hits.truncate(limit);
            hits
        })
    }
}

/// Styles held in memory, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct InMemoryStyleRegistry {
    styles: HashMap<String, Style>,
}

impl InMemoryStyleRegistry {
    pub fn new(styles: Vec<Style>) -> Self {
        Self {
            styles: styles
                .into_iter()
                .map(|style| (style.key.to_lowercase(), style))
                .collect(),
        }
    }

    /// A small built-in set used when no style file is configured.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Style {
                key: "concise".to_string(),
                name: "Concise".to_string(),
                system_prompt: "Answer in at most three short sentences. Skip preambles and \
                                restating the question."
                    .to_string(),
                model_override: None,
            },
            Style {
                key: "tutor".to_string(),
                name: "Tutor".to_string(),
                system_prompt: "Explain step by step as a patient tutor. End with one short \
                                question that checks understanding."
                    .to_string(),
                model_override: None,
            },
            Style {
                key: "bullet".to_string(),
                name: "Bullet points".to_string(),
                system_prompt: "Reply only with a bulleted list of key points.".to_string(),
                model_override: None,
            },
        ])
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.styles.values().map(|s| s.key.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

#[async_trait]
impl StyleRegistry for InMemoryStyleRegistry {
    async fn get_by_key(&self, key: &str) -> Result<Option<Style>> {
        Ok(self.styles.get(&key.trim().to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn note(id: &str, owner: &str, title: &str, body: &str, notebook: Option<&str>) -> Note {
        Note {
            id: id.to_string(),
            owner_id: owner.to_string(),
            title: title.to_string(),
            plain_content: body.to_string(),
            notebook: notebook.map(str::to_string),
            updated_at: Utc::now(),
        }
    }

    fn store() -> InMemoryNoteStore {
        let store = InMemoryNoteStore::new();
        store
            .upsert(
                note("n1", "alice", "Groceries", "milk, eggs, flour", Some("Home")),
                vec![("milk, eggs, flour".to_string(), vec![1.0, 0.0])],
            )
            .unwrap();
        store
            .upsert(
                note("n2", "alice", "Baking plan", "buy groceries for the cake", None),
                vec![("buy groceries for the cake".to_string(), vec![0.7, 0.7])],
            )
            .unwrap();
        store
            .insert_note(note("n3", "bob", "Groceries", "bob's list", Some("Home")))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_lookups_are_owner_scoped() {
        let store = store();
        assert!(store.find_by_owner_and_id("alice", "n3").await.unwrap().is_none());
        assert!(store.find_by_owner_and_id("bob", "n3").await.unwrap().is_some());

        let titled = store
            .find_by_owner_and_exact_title("alice", "groceries")
            .await
            .unwrap();
        assert_eq!(titled.len(), 1);
        assert_eq!(titled[0].id, "n1");
    }

    #[tokio::test]
    async fn test_fuzzy_ranks_title_matches_first() {
        let store = store();
        let hits = store.find_by_owner_fuzzy("alice", "groceries", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_literal_search_with_notebook_filter() {
        let store = store();
        let filters = RetrievalFilters {
            notebook: Some("home".to_string()),
            title: None,
        };
        let hits = store.search_literal("alice", "", &filters, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "n1");
    }

    #[tokio::test]
    async fn test_empty_terms_list_most_recent_first() {
        let store = InMemoryNoteStore::new();
        let mut older = note("old", "alice", "Old", "", None);
        older.updated_at = Utc::now() - Duration::days(2);
        store.insert_note(older).unwrap();
        store.insert_note(note("new", "alice", "New", "", None)).unwrap();

        let hits = store
            .search_literal("alice", "", &RetrievalFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "new");
    }

    #[tokio::test]
    async fn test_similar_chunks_respect_threshold() {
        let store = store();
        let hits = store
            .search_similar_chunks("alice", &[1.0, 0.0], 10, 0.8)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, "n1");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_style_registry_is_case_insensitive() {
        let registry = InMemoryStyleRegistry::with_defaults();
        assert!(registry.get_by_key("Tutor").await.unwrap().is_some());
        assert!(registry.get_by_key("pirate").await.unwrap().is_none());
        assert_eq!(registry.keys(), vec!["bullet", "concise", "tutor"]);
    }
}
