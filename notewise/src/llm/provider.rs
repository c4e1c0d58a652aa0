use async_trait::async_trait;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{ChatError, Result};
use crate::llm::api::LlmApiClient;
use crate::models::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Overrides the configured model for this call, e.g. a style's model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Chat-completion seam used by the planner and answer generation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: Option<&ChatOptions>)
        -> Result<String>;

    /// Single-prompt completion.
    async fn generate(&self, prompt: &str, options: Option<&ChatOptions>) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }
}

#[derive(Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    client: Option<LlmApiClient>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            _ => {
                if let Some(base_url) = &config.base_url {
                    LlmBackend::OpenAICompatible {
                        base_url: base_url.clone(),
                    }
                } else {
                    return Self::unavailable(&format!(
                        "Unknown provider in model: {}",
                        config.model
                    ));
                }
            }
        };

        match LlmApiClient::new(config) {
            Ok(client) => Self {
                backend,
                client: Some(client),
            },
            Err(e) => {
                tracing::warn!(error = %e, model = %config.model, "LLM client unavailable");
                Self::unavailable(&e.to_string())
            }
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            client: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    fn unavailable_reason(&self) -> String {
        match &self.backend {
            LlmBackend::Unavailable { reason } => reason.clone(),
            _ => "LLM client not initialised".to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for LlmProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
    ) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ChatError::LlmUnavailable(self.unavailable_reason()))?;

        client.chat(messages, options).await
    }
}
