use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingPurpose;
use crate::error::{ChatError, Result};

/// Provider-specific default base URLs
pub fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// How a query or a note passage is marked before it reaches the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStyle {
    /// Text is sent as is.
    Plain,
    /// Text is prefixed, as nomic and E5 models are trained to expect.
    Prefix { query: String, document: String },
    /// Purpose goes in the request's `input_type` field.
    InputType,
}

impl InputStyle {
    /// Default for a model name: known prefix-trained families get their
    /// prefixes, everything else is plain.
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.contains("nomic-embed") {
            Self::prefix("search_query: ", "search_document: ")
        } else if model.contains("e5-") {
            Self::prefix("query: ", "passage: ")
        } else {
            Self::Plain
        }
    }

    /// Parse `EMBEDDING_INPUT_STYLE` (`plain`, `prefix`, `input_type`). A
    /// `prefix` value falls back to the model's own prefixes when none are
    /// configured.
    pub fn from_setting(
        setting: &str,
        model: &str,
        query_prefix: Option<&str>,
        document_prefix: Option<&str>,
    ) -> Option<Self> {
        match setting.trim().to_lowercase().as_str() {
            "plain" | "none" => Some(Self::Plain),
            "input_type" => Some(Self::InputType),
            "prefix" => Some(match (query_prefix, document_prefix) {
                (None, None) => match Self::for_model(model) {
                    Self::Plain => Self::prefix("query: ", "passage: "),
                    style => style,
                },
                (query, document) => Self::prefix(query.unwrap_or(""), document.unwrap_or("")),
            }),
            _ => None,
        }
    }

    fn prefix(query: &str, document: &str) -> Self {
        Self::Prefix {
            query: query.to_string(),
            document: document.to_string(),
        }
    }

    fn shape(&self, texts: &[&str], purpose: EmbeddingPurpose) -> Vec<String> {
        match self {
            Self::Prefix { query, document } => {
                let prefix = match purpose {
                    EmbeddingPurpose::Query => query,
                    EmbeddingPurpose::Document => document,
                };
                texts.iter().map(|t| format!("{prefix}{t}")).collect()
            }
            Self::Plain | Self::InputType => texts.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn input_type(&self, purpose: EmbeddingPurpose) -> Option<&'static str> {
        match (self, purpose) {
            (Self::InputType, EmbeddingPurpose::Query) => Some("query"),
            (Self::InputType, EmbeddingPurpose::Document) => Some("document"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub input_style: InputStyle,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// What to do after one HTTP attempt.
enum Attempt {
    Done(Vec<Vec<f32>>),
    Retry {
        error: ChatError,
        wait: Option<Duration>,
    },
    Fail(ChatError),
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    config: ApiConfig,
}

impl EmbeddingApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn input_style(&self) -> &InputStyle {
        &self.config.input_style
    }

    /// Embed `texts` for `purpose` in one request, results in input order.
    ///
    /// Rate limits, server errors and transport failures are retried up to
    /// `max_retries` times with exponential backoff (a `Retry-After` header
    /// wins when shorter than the backoff cap); other statuses fail at once.
    pub async fn embed(&self, texts: &[&str], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: self.config.input_style.shape(texts, purpose),
            input_type: self.config.input_style.input_type(purpose),
        };
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut backoff = retry_backoff();

        let mut attempt = 0;
        loop {
            let outcome = match self.send(&url, &request).await {
                Ok(response) => read_response(response, texts.len()).await,
                Err(e) => Attempt::Retry {
                    error: ChatError::Embedding(format!("Request failed: {e}")),
                    wait: None,
                },
            };

            let (error, wait) = match outcome {
                Attempt::Done(embeddings) => return Ok(embeddings),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry { error, wait } => (error, wait),
            };

            if attempt >= self.config.max_retries {
                return Err(error);
            }
            attempt += 1;

            let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
            let delay = wait.map_or(delay, |w| w.min(backoff.max_interval));
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying embedding request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send(&self, url: &str, request: &EmbeddingRequest<'_>) -> reqwest::Result<Response> {
        let mut builder = self.client.post(url).json(request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }
        builder.send().await
    }
}

fn retry_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(100),
        initial_interval: Duration::from_millis(100),
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: Duration::from_secs(5),
        max_elapsed_time: None,
        ..Default::default()
    }
}

async fn read_response(response: Response, expected: usize) -> Attempt {
    let status = response.status();

    if status.is_success() {
        return match response.json::<EmbeddingResponse>().await {
            Ok(body) => match ordered_embeddings(body, expected) {
                Ok(embeddings) => Attempt::Done(embeddings),
                Err(e) => Attempt::Fail(e),
            },
            Err(e) => Attempt::Fail(ChatError::Embedding(format!("Failed to parse response: {e}"))),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        tracing::warn!(?retry_after, "Embedding API rate limited");
        return Attempt::Retry {
            error: ChatError::ApiRateLimit { retry_after },
            wait: retry_after.map(Duration::from_secs),
        };
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Attempt::Fail(ChatError::ApiAuth(body)),
        s if s.is_server_error() => Attempt::Retry {
            error: ChatError::Embedding(format!("Server error {s}: {body}")),
            wait: None,
        },
        s => Attempt::Fail(ChatError::Embedding(format!("API error {s}: {body}"))),
    }
}

/// Providers may return items out of order; `index`, when present, is the
/// position in the request.
fn ordered_embeddings(mut body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if body.data.len() != expected {
        return Err(ChatError::Embedding(format!(
            "Expected {expected} embeddings, got {}",
            body.data.len()
        )));
    }

    if body.data.iter().all(|d| d.index.is_some()) {
        body.data.sort_by_key(|d| d.index);
    }
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}
