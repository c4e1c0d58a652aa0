mod api;
mod cache;
mod provider;

#[cfg(test)]
mod tests;

pub use api::{default_base_url, ApiConfig, EmbeddingApiClient, InputStyle};
pub use cache::QueryEmbeddingCache;
pub use provider::{Embedder, EmbeddingProvider, EmbeddingPurpose};
