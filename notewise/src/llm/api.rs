use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{ChatError, Result},
    llm::provider::ChatOptions,
    models::{ChatMessage, Role},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
    temperature: Option<f32>,
}

#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(ChatError::LlmUnavailable(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| ChatError::Llm(format!("Failed to create LLM HTTP client: {error}")))?;

        // async-openai retries 5xx on its own; bound that by our timeout so
        // the retry loop in `chat` stays in charge.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send an ordered transcript and return the assistant reply.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
    ) -> Result<String> {
        if messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(ChatError::Validation("Chat transcript cannot be empty".to_string()));
        }

        let mut last_error: Option<ChatError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = self.build_request(messages, options)?;

            match self.client.chat().create(request).await {
                Ok(response) => return Self::extract_content(response),
                Err(error) => {
                    if let Some(rate_limit_error) = Self::rate_limit_error(&error) {
                        return Err(rate_limit_error);
                    }

                    if let Some(auth_error) = Self::auth_error(&error) {
                        return Err(auth_error);
                    }

                    let retryable = Self::is_retryable(&error);
                    let mapped_error = Self::map_openai_error(error);

                    if retryable && attempt < self.config.max_retries {
                        tracing::debug!(attempt, error = %mapped_error, "Retrying LLM request");
                        last_error = Some(mapped_error);
                        continue;
                    }

                    return Err(mapped_error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChatError::Llm("LLM completion failed after retries".to_string())))
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let model = options
            .and_then(|o| o.model.clone())
            .unwrap_or_else(|| self.config.model.clone());

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(model).messages(messages);

        let temperature = options
            .and_then(|o| o.temperature)
            .or(self.config.temperature);
        if let Some(temperature) = temperature {
            request.temperature(temperature);
        }

        if let Some(max_tokens) = options.and_then(|o| o.max_tokens) {
            request.max_tokens(max_tokens);
        }

        request.build().map_err(|error| {
            ChatError::Validation(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let invalid = |error: async_openai::error::OpenAIError| {
            ChatError::Validation(format!("Invalid {} message: {error}", message.role))
        };

        Ok(match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map_err(invalid)?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map_err(invalid)?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map_err(invalid)?
                .into(),
        })
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Llm("LLM response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(ChatError::Llm(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(message)
    }

    fn is_retryable(error: &OpenAIError) -> bool {
        match error {
            OpenAIError::ApiError(api_error) => {
                api_error.r#type.is_none() && api_error.code.is_none()
            }
            OpenAIError::Reqwest(reqwest_error) => reqwest_error
                .status()
                .map(|status| status.is_server_error())
                .unwrap_or(true),
            _ => false,
        }
    }

    fn rate_limit_error(error: &OpenAIError) -> Option<ChatError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) =>
            {
                Some(ChatError::LlmRateLimit { retry_after: None })
            }
            OpenAIError::ApiError(api_error) if Self::is_rate_limit_api_error(api_error) => {
                Some(ChatError::LlmRateLimit { retry_after: None })
            }
            _ => None,
        }
    }

    fn auth_error(error: &OpenAIError) -> Option<ChatError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                    || reqwest_error.status() == Some(reqwest::StatusCode::FORBIDDEN) =>
            {
                Some(ChatError::ApiAuth(format!(
                    "LLM authentication failed: {reqwest_error}"
                )))
            }
            OpenAIError::ApiError(api_error) if Self::is_auth_api_error(api_error) => Some(
                ChatError::ApiAuth(format!("LLM authentication failed: {api_error}")),
            ),
            _ => None,
        }
    }

    fn is_rate_limit_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("rate limit")
            || message.contains("too many requests")
            || error_type.contains("rate_limit")
            || code.contains("rate_limit")
            || code == "insufficient_quota"
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("unauthorized")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
            || error_type.contains("authentication")
    }

    fn map_openai_error(error: OpenAIError) -> ChatError {
        match error {
            OpenAIError::Reqwest(reqwest_error) => {
                ChatError::Llm(format!("LLM request failed: {reqwest_error}"))
            }
            OpenAIError::ApiError(api_error) => {
                ChatError::Llm(format!("LLM API error: {api_error}"))
            }
            OpenAIError::JSONDeserialize(err) => {
                ChatError::Llm(format!("Failed to parse LLM response: {err}"))
            }
            OpenAIError::InvalidArgument(message) => ChatError::Validation(message),
            other => ChatError::Llm(other.to_string()),
        }
    }
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_llm_config() -> LlmConfig {
        LlmConfig {
            model: "ollama/llama3".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            max_retries: 0,
            temperature: Some(0.2),
        }
    }

    #[test]
    fn test_provider_prefix_is_stripped_from_model() {
        let client = LlmApiClient::new(&test_llm_config()).expect("client should be created");
        assert_eq!(client.model(), "llama3");
        assert_eq!(client.config.base_url, OLLAMA_BASE_URL);
    }

    #[test]
    fn test_hosted_provider_requires_key() {
        let config = LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            ..test_llm_config()
        };
        assert!(matches!(
            LlmApiClient::new(&config),
            Err(ChatError::LlmUnavailable(_))
        ));
    }

    #[test]
    fn test_build_request_keeps_roles_and_skips_blank_messages() {
        let client = LlmApiClient::new(&test_llm_config()).expect("client should be created");
        let transcript = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("   "),
            ChatMessage::assistant("hello"),
        ];

        let request = client
            .build_request(&transcript, None)
            .expect("request should build");

        assert_eq!(request.messages.len(), 3);
        assert!(matches!(
            request.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            request.messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn test_options_override_model_and_temperature() {
        let client = LlmApiClient::new(&test_llm_config()).expect("client should be created");
        let options = ChatOptions {
            model: Some("mistral".to_string()),
            temperature: Some(0.9),
            max_tokens: Some(64),
        };

        let request = client
            .build_request(&[ChatMessage::user("hi")], Some(&options))
            .expect("request should build");

        assert_eq!(request.model, "mistral");
        assert_eq!(request.temperature, Some(0.9));
    }
}
