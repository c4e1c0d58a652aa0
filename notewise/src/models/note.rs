use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note as handed over by the note store, content already rendered to
/// plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub plain_content: String,
    pub notebook: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A retrieval candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub plain_content: String,
    pub notebook: Option<String>,
    /// Similarity in `0.0..=1.0`; only set by semantic retrieval.
    pub relevance_score: Option<f32>,
}

impl Document {
    pub fn from_note(note: &Note, relevance_score: Option<f32>) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            plain_content: note.plain_content.clone(),
            notebook: note.notebook.clone(),
            relevance_score,
        }
    }
}

impl From<Note> for Document {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            title: note.title,
            plain_content: note.plain_content,
            notebook: note.notebook,
            relevance_score: None,
        }
    }
}

/// A note chunk returned by vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub note_id: String,
    pub chunk_content: String,
    pub score: f32,
}
