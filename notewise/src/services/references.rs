use std::collections::HashSet;
use std::sync::Arc;

use crate::db::NoteStore;
use crate::error::Result;
use crate::models::{Note, ParsedReference, ReferenceKind, ResolvedReference};

const NOT_FOUND: &str = "note not found";

/// Resolves explicit note references against the owner's notes.
#[derive(Clone)]
pub struct ReferenceResolver {
    notes: Arc<dyn NoteStore>,
}

impl ReferenceResolver {
    pub fn new(notes: Arc<dyn NoteStore>) -> Self {
        Self { notes }
    }

    /// Resolve every reference in input order. A note referenced twice is
    /// returned once; failures are reported per entry and never abort the
    /// batch.
    pub async fn resolve(
        &self,
        user_id: &str,
        references: &[ParsedReference],
    ) -> Vec<ResolvedReference> {
        let mut resolved = Vec::with_capacity(references.len());
        let mut seen_notes = HashSet::new();
        let mut seen_missing = HashSet::new();

        for reference in references {
            match self.lookup(user_id, reference).await {
                Ok(Some(note)) => {
                    if !seen_notes.insert(note.id.clone()) {
                        tracing::debug!(note_id = %note.id, "Dropping duplicate reference");
                        continue;
                    }
                    resolved.push(ResolvedReference::found(
                        &note.id,
                        &note.title,
                        &note.plain_content,
                        &reference.value,
                    ));
                }
                Ok(None) => {
                    if seen_missing.insert(reference.value.trim().to_lowercase()) {
                        resolved.push(ResolvedReference::missing(&reference.value, NOT_FOUND));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        kind = %reference.kind,
                        reference = %reference.value,
                        error = %e,
                        "Reference lookup failed"
                    );
                    if seen_missing.insert(reference.value.trim().to_lowercase()) {
                        resolved.push(ResolvedReference::missing(
                            &reference.value,
                            format!("lookup failed: {e}"),
                        ));
                    }
                }
            }
        }

        resolved
    }

    async fn lookup(&self, user_id: &str, reference: &ParsedReference) -> Result<Option<Note>> {
        match reference.kind {
            ReferenceKind::ExactId => {
                self.notes
                    .find_by_owner_and_id(user_id, &reference.value)
                    .await
            }
            ReferenceKind::QuotedTitle => {
                let exact = self
                    .notes
                    .find_by_owner_and_exact_title(user_id, &reference.value)
                    .await?;
                match exact.into_iter().next() {
                    Some(note) => Ok(Some(note)),
                    None => self.fuzzy(user_id, &reference.value).await,
                }
            }
            ReferenceKind::FreeText => self.fuzzy(user_id, &reference.value).await,
        }
    }

    async fn fuzzy(&self, user_id: &str, text: &str) -> Result<Option<Note>> {
        let matches = self.notes.find_by_owner_fuzzy(user_id, text, 1).await?;
        Ok(matches.into_iter().next())
    }
}

/// Collapse already-resolved references (e.g. ones attached by the caller)
/// the same way `resolve` does: one entry per note id, one per missing
/// request, input order kept.
pub(crate) fn dedupe_resolved(references: Vec<ResolvedReference>) -> Vec<ResolvedReference> {
    let mut seen_notes = HashSet::new();
    let mut seen_missing = HashSet::new();

    references
        .into_iter()
        .filter(|reference| match &reference.note_id {
            Some(note_id) if reference.found => seen_notes.insert(note_id.clone()),
            _ => seen_missing.insert(reference.requested.trim().to_lowercase()),
        })
        .collect()
}
