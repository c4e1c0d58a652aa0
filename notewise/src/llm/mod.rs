mod api;
pub mod prompts;
mod provider;

pub use api::LlmApiClient;
pub use provider::{ChatModel, ChatOptions, LlmBackend, LlmProvider};
