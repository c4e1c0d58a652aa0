//! Pure parsing of user utterances: mode directives and inline note references.

mod directive;
mod references;

pub use directive::{parse_directive, BYPASS_PREFIX, BYPASS_STYLE_PREFIX, RAG_PREFIX, STYLE_PREFIX};
pub use references::{parse_references, ReferenceParse, REFERENCE_TAG};
