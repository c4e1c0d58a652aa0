mod chat;
mod history;
mod references;
mod retrieval;

pub use chat::ChatService;
pub use history::HistoryLoader;
pub use references::ReferenceResolver;
pub use retrieval::RetrievalService;
