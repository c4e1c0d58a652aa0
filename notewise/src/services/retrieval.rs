use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, StreamExt, TryStreamExt};

use crate::config::{
    live_multi_doc_threshold, live_similarity_threshold, ConfigSource, RetrievalConfig,
};
use crate::db::NoteStore;
use crate::embeddings::{Embedder, EmbeddingPurpose, QueryEmbeddingCache};
use crate::error::{ChatError, Result};
use crate::models::{ChunkHit, Document, RetrievalFilters, RetrievalOutcome, SearchStrategy};
use crate::search::{classify_ambiguity, determine_strategy, literal_terms, parse_structural_filter};

/// Finds candidate notes for a query and classifies the result set.
#[derive(Clone)]
pub struct RetrievalService {
    notes: Arc<dyn NoteStore>,
    embedder: Arc<dyn Embedder>,
    live_config: Arc<dyn ConfigSource>,
    cache: QueryEmbeddingCache,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        embedder: Arc<dyn Embedder>,
        live_config: Arc<dyn ConfigSource>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            notes,
            embedder,
            live_config,
            cache: QueryEmbeddingCache::new(config.embedding_cache_size),
            config: config.clone(),
        }
    }

    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        filters: &RetrievalFilters,
    ) -> Result<RetrievalOutcome> {
        let start = Instant::now();

        let (strategy, documents) = if let Some(structural) = parse_structural_filter(query) {
            let filters = filters.merged_with(&structural.filters);
            let docs = self.literal(user_id, &structural.terms, &filters).await?;
            (SearchStrategy::Filtered, docs)
        } else if !filters.is_empty() {
            let docs = self.literal(user_id, &literal_terms(query), filters).await?;
            (SearchStrategy::Filtered, docs)
        } else {
            match determine_strategy(query) {
                SearchStrategy::Semantic => (SearchStrategy::Semantic, self.semantic(user_id, query).await?),
                _ => {
                    let docs = self
                        .literal(user_id, &literal_terms(query), &RetrievalFilters::default())
                        .await?;
                    (SearchStrategy::Literal, docs)
                }
            }
        };

        let multi_doc_threshold =
            live_multi_doc_threshold(self.live_config.as_ref(), self.config.multi_doc_threshold);
        let ambiguity_reason = classify_ambiguity(query, &documents, multi_doc_threshold);

        tracing::info!(
            user_id,
            strategy = %strategy,
            results = documents.len(),
            ambiguous = ambiguity_reason.is_some(),
            timing_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );

        Ok(RetrievalOutcome {
            documents,
            strategy,
            ambiguous: ambiguity_reason.is_some(),
            ambiguity_reason,
        })
    }

    async fn literal(
        &self,
        user_id: &str,
        terms: &str,
        filters: &RetrievalFilters,
    ) -> Result<Vec<Document>> {
        let notes = self
            .notes
            .search_literal(user_id, terms, filters, self.config.top_k)
            .await?;
        Ok(notes.into_iter().map(Document::from).collect())
    }

    async fn semantic(&self, user_id: &str, query: &str) -> Result<Vec<Document>> {
        let embedding = self.query_embedding(query).await?;
        let threshold =
            live_similarity_threshold(self.live_config.as_ref(), self.config.similarity_threshold);

        let hits = self
            .notes
            .search_similar_chunks(user_id, &embedding, self.config.top_k * 3, threshold)
            .await?;
        let ranked = best_hit_per_note(hits, self.config.top_k);

        let notes = Arc::clone(&self.notes);
        let documents: Vec<Option<Document>> = stream::iter(ranked)
            .map(|(note_id, score)| {
                let notes = Arc::clone(&notes);
                async move {
                    let note = notes.find_by_owner_and_id(user_id, &note_id).await?;
                    if note.is_none() {
                        tracing::debug!(note_id = %note_id, "Chunk hit for a note that no longer exists");
                    }
                    Ok::<_, ChatError>(note.map(|n| Document::from_note(&n, Some(score.clamp(0.0, 1.0)))))
                }
            })
            .buffered(self.config.fanout.max(1))
            .try_collect()
            .await?;

        Ok(documents.into_iter().flatten().collect())
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(query) {
            tracing::debug!("Query embedding cache hit");
            return Ok(cached);
        }

        let timeout = Duration::from_secs(self.config.embedding_timeout_secs);
        let embedding = tokio::time::timeout(timeout, self.embedder.embed(query, EmbeddingPurpose::Query))
            .await
            .map_err(|_| ChatError::Timeout("Query embedding".to_string()))??;

        self.cache.put(query, embedding.clone());
        Ok(embedding)
    }
}

/// Collapse chunk hits to one entry per note, keeping the best score, most
/// relevant first.
fn best_hit_per_note(mut hits: Vec<ChunkHit>, limit: usize) -> Vec<(String, f32)> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.note_id.clone()))
        .take(limit)
        .map(|hit| (hit.note_id, hit.score))
        .collect()
}
