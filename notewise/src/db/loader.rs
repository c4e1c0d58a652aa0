use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

use super::backends::memory::InMemoryNoteStore;
use crate::embeddings::{Embedder, EmbeddingPurpose};
use crate::error::{ChatError, Result};
use crate::models::{Note, Style};

/// Upper bound on the characters of a single embedded chunk.
pub const CHUNK_MAX_CHARS: usize = 800;

/// On-disk note format accepted by [`load_notes_file`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub owner_id: String,
    pub title: String,
    #[serde(alias = "plainContent")]
    pub content: String,
    #[serde(default)]
    pub notebook: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteRecord {
    pub fn into_note(self) -> Note {
        Note {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            owner_id: self.owner_id,
            title: self.title,
            plain_content: self.content,
            notebook: self.notebook,
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

pub async fn load_notes_file(path: impl AsRef<Path>) -> Result<Vec<NoteRecord>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await?;
    let records: Vec<NoteRecord> = serde_json::from_str(&raw)?;

    if let Some(record) = records.iter().find(|r| r.owner_id.trim().is_empty()) {
        return Err(ChatError::Validation(format!(
            "Note '{}' in {} has no ownerId",
            record.title,
            path.display()
        )));
    }

    Ok(records)
}

pub async fn load_styles_file(path: impl AsRef<Path>) -> Result<Vec<Style>> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    let styles: Vec<Style> = serde_json::from_str(&raw)?;

    if styles.iter().any(|s| s.key.trim().is_empty()) {
        return Err(ChatError::Validation("Style with empty key".to_string()));
    }

    Ok(styles)
}

/// Split note content into sentence-aligned chunks of at most `max_chars`
/// characters. A single sentence longer than the limit becomes its own chunk.
pub fn chunk_plain_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.unicode_sentences() {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let projected = current.chars().count() + 1 + sentence.chars().count();
        if !current.is_empty() && projected > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Embed every record's chunks and store the notes. Returns the number of
/// notes indexed.
pub async fn index_notes(
    store: &InMemoryNoteStore,
    embedder: &dyn Embedder,
    records: Vec<NoteRecord>,
) -> Result<usize> {
    let mut indexed = 0;

    for record in records {
        let note = record.into_note();
        let mut chunks = chunk_plain_text(&note.plain_content, CHUNK_MAX_CHARS);
        if chunks.is_empty() {
            chunks.push(note.title.clone());
        }

        let embeddings = embedder
            .embed_batch(chunks.clone(), EmbeddingPurpose::Document)
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ChatError::Embedding(format!(
                "Expected {} chunk embeddings for note {}, got {}",
                chunks.len(),
                note.id,
                embeddings.len()
            )));
        }

        tracing::debug!(note_id = %note.id, chunks = chunks.len(), "Indexed note");
        store.upsert(note, chunks.into_iter().zip(embeddings).collect())?;
        indexed += 1;
    }

    Ok(indexed)
}
