use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

use super::api::{default_base_url, ApiConfig, EmbeddingApiClient, InputStyle};
use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{ChatError, Result};

/// Whether a text is a search query or stored note content. Asymmetric
/// models embed the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPurpose {
    Query,
    Document,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Vec<f32>>;

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        purpose: EmbeddingPurpose,
    ) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in &texts {
            embeddings.push(self.embed(text, purpose).await?);
        }
        Ok(embeddings)
    }
}

enum EmbeddingBackend {
    Local {
        model: Arc<Mutex<TextEmbedding>>,
        batch_size: usize,
    },
    Api(EmbeddingApiClient),
}

pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingProvider {
    /// Builds a local fastembed model for `local/...` or unprefixed names and
    /// an OpenAI-compatible API client for the other known providers.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model_name) = parse_provider_model(&config.model);

        if provider == "local" {
            return Self::new_local(config, model_name);
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        if config.api_key.is_none() && matches!(provider, "openai" | "openrouter") {
            return Err(ChatError::Embedding(format!(
                "EMBEDDING_API_KEY is required for provider {provider}"
            )));
        }

        let input_style = resolve_input_style(config, model_name);
        tracing::info!(provider, model = model_name, %base_url, ?input_style, "Using embedding API");

        let client = EmbeddingApiClient::new(ApiConfig {
            base_url,
            api_key: config.api_key.clone(),
            model: model_name.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            input_style,
        })?;

        Ok(Self {
            backend: EmbeddingBackend::Api(client),
            dimensions: config.dimensions,
        })
    }

    fn new_local(config: &EmbeddingsConfig, model_name: &str) -> Result<Self> {
        let embedding_model = resolve_embedding_model(model_name);
        tracing::info!(model = model_name, "Loading local embedding model");

        let model = TextEmbedding::try_new(
            InitOptions::new(embedding_model).with_show_download_progress(true),
        )
        .map_err(|e| ChatError::Embedding(e.to_string()))?;

        Ok(Self {
            backend: EmbeddingBackend::Local {
                model: Arc::new(Mutex::new(model)),
                batch_size: config.batch_size.max(1),
            },
            dimensions: config.dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_texts(&self, texts: Vec<String>, purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => {
                // E5/BGE style models expect role prefixes
                let prefix = match purpose {
                    EmbeddingPurpose::Query => "query: ",
                    EmbeddingPurpose::Document => "passage: ",
                };
                let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
                let model = Arc::clone(model);
                let batch_size = *batch_size;

                tokio::task::spawn_blocking(move || {
                    let mut model = model.lock().map_err(|e| {
                        ChatError::Embedding(format!("Embedding model lock poisoned: {e}"))
                    })?;
                    model
                        .embed(prefixed, Some(batch_size))
                        .map_err(|e| ChatError::Embedding(e.to_string()))
                })
                .await
                .map_err(|e| ChatError::Embedding(format!("Embedding worker failed: {e}")))?
            }
            EmbeddingBackend::Api(client) => {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                client.embed(&refs, purpose).await
            }
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Vec<f32>> {
        self.embed_texts(vec![text.to_string()], purpose)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding("No embedding generated".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        purpose: EmbeddingPurpose,
    ) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts, purpose).await
    }
}

/// Explicit prefixes imply the prefix style; an unknown setting falls back to
/// the model's default.
fn resolve_input_style(config: &EmbeddingsConfig, model_name: &str) -> InputStyle {
    let query = config.query_prefix.as_deref();
    let document = config.document_prefix.as_deref();

    let setting = match config.input_style.as_deref() {
        Some(setting) => setting,
        None if query.is_some() || document.is_some() => "prefix",
        None => return InputStyle::for_model(model_name),
    };

    InputStyle::from_setting(setting, model_name, query, document).unwrap_or_else(|| {
        tracing::warn!(setting, "Unknown embedding input style, using the model default");
        InputStyle::for_model(model_name)
    })
}

fn resolve_embedding_model(model_name: &str) -> EmbeddingModel {
    match model_name {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            EmbeddingModel::NomicEmbedTextV15
        }
        other => {
            tracing::warn!(model = other, "Unknown local embedding model, using bge-small-en-v1.5");
            EmbeddingModel::BGESmallENV15
        }
    }
}
