use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkHit, Note, RetrievalFilters, Style};

// ---------------------------------------------------------------------------
// Collaborator store traits
// ---------------------------------------------------------------------------

/// Owner-scoped read access to notes. Every lookup is restricted to notes the
/// given owner can see; content arrives already rendered to plain text.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn find_by_owner_and_id(&self, owner_id: &str, note_id: &str) -> Result<Option<Note>>;

    async fn find_by_owner_and_exact_title(&self, owner_id: &str, title: &str)
        -> Result<Vec<Note>>;

    /// Substring match, title matches ranked above body matches.
    async fn find_by_owner_fuzzy(&self, owner_id: &str, text: &str, limit: usize)
        -> Result<Vec<Note>>;

    /// Keyword match inside optional structural filters. Empty `terms` lists
    /// every note the filters allow, most recently updated first.
    async fn search_literal(
        &self,
        owner_id: &str,
        terms: &str,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<Note>>;

    /// Nearest note chunks at or above `threshold`, best first.
    async fn search_similar_chunks(
        &self,
        owner_id: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkHit>>;
}

/// Named styles that can be layered on top of either base mode.
#[async_trait]
pub trait StyleRegistry: Send + Sync {
    async fn get_by_key(&self, key: &str) -> Result<Option<Style>>;
}
