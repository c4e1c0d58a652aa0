//! Conversational retrieval core for a note-taking assistant.
//!
//! [`services::ChatService`] is the entry point: it parses mode directives
//! and note references, keeps per-conversation retrieval state, and answers
//! either directly or grounded in the user's notes.

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod intelligence;
pub mod llm;
pub mod models;
pub mod processing;
pub mod search;
pub mod services;
pub mod sessions;
