pub mod backends;
mod loader;
pub mod traits;

pub use backends::memory::{InMemoryNoteStore, InMemoryStyleRegistry};
pub use loader::{chunk_plain_text, index_notes, load_notes_file, load_styles_file, NoteRecord};
pub use traits::*;
