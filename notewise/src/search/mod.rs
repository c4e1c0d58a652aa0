mod ambiguity;
mod strategy;

pub use ambiguity::{classify_ambiguity, normalize_title, title_overlap_score, NEAR_DUPLICATE_OVERLAP};
pub use strategy::{determine_strategy, literal_terms, parse_structural_filter, StructuralFilter};
