use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

use crate::models::ChatMode;

/// Live key for the semantic similarity cut-off.
pub const SIMILARITY_THRESHOLD_KEY: &str = "RAG_SIMILARITY_THRESHOLD";
/// Live key for the result count at which ambiguity detection kicks in.
pub const MULTI_DOC_THRESHOLD_KEY: &str = "RAG_MULTI_DOC_THRESHOLD";

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.35;
pub const DEFAULT_MULTI_DOC_THRESHOLD: usize = 3;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

/// Parse `CHAT_STICKY_MODES`.
/// Format: comma-separated mode names, e.g. `bypass,bypass_style`
fn parse_sticky_modes() -> Vec<ChatMode> {
    match env::var("CHAT_STICKY_MODES") {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .filter_map(|raw| match raw.trim().parse::<ChatMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    tracing::warn!("Invalid mode '{}' in CHAT_STICKY_MODES: {}, skipping", raw, e);
                    None
                }
            })
            .collect(),
        _ => ChatConfig::default_sticky_modes(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chat: ChatConfig,
    pub retrieval: RetrievalConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: Option<LlmConfig>,
}

/// Per-turn behaviour of the pipeline router.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub max_references: usize,
    pub history_turns: usize,
    pub sticky_modes: Vec<ChatMode>,
    pub planner_timeout_secs: u64,
    pub generation_timeout_secs: u64,
}

impl ChatConfig {
    pub fn default_sticky_modes() -> Vec<ChatMode> {
        vec![ChatMode::Bypass, ChatMode::BypassStyle, ChatMode::RagStyle]
    }

    pub fn is_sticky(&self, mode: ChatMode) -> bool {
        self.sticky_modes.contains(&mode)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_references: 5,
            history_turns: 10,
            sticky_modes: Self::default_sticky_modes(),
            planner_timeout_secs: 15,
            generation_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    // Fallbacks when the live config source has no usable value
    pub similarity_threshold: f32,
    pub multi_doc_threshold: usize,
    /// Upper bound on concurrent note lookups while hydrating semantic hits.
    pub fanout: usize,
    pub embedding_timeout_secs: u64,
    pub embedding_cache_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            multi_doc_threshold: DEFAULT_MULTI_DOC_THRESHOLD,
            fanout: 8,
            embedding_timeout_secs: 15,
            embedding_cache_size: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// `plain`, `prefix` or `input_type`; picked from the model name when unset.
    pub input_style: Option<String>,
    pub query_prefix: Option<String>,
    pub document_prefix: Option<String>,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                max_references: parse_env_or("CHAT_MAX_REFERENCES", 5),
                history_turns: parse_env_or("CHAT_HISTORY_TURNS", 10),
                sticky_modes: parse_sticky_modes(),
                planner_timeout_secs: parse_env_or("CHAT_PLANNER_TIMEOUT_SECS", 15),
                generation_timeout_secs: parse_env_or("CHAT_GENERATION_TIMEOUT_SECS", 60),
            },
            retrieval: RetrievalConfig {
                top_k: parse_env_or("RETRIEVAL_TOP_K", 10),
                similarity_threshold: parse_env_or(
                    SIMILARITY_THRESHOLD_KEY,
                    DEFAULT_SIMILARITY_THRESHOLD,
                ),
                multi_doc_threshold: parse_env_or(
                    MULTI_DOC_THRESHOLD_KEY,
                    DEFAULT_MULTI_DOC_THRESHOLD,
                ),
                fanout: parse_env_or("RETRIEVAL_FANOUT", 8),
                embedding_timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 15),
                embedding_cache_size: parse_env_or("RETRIEVAL_EMBEDDING_CACHE_SIZE", 256),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 256),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 15),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
                input_style: env::var("EMBEDDING_INPUT_STYLE").ok(),
                query_prefix: env::var("EMBEDDING_QUERY_PREFIX").ok(),
                document_prefix: env::var("EMBEDDING_DOCUMENT_PREFIX").ok(),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                temperature: parse_env_opt("LLM_TEMPERATURE"),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Key/value source for operator-tunable settings that must take effect
/// without a restart. Lookups never fail; a missing key is `None`.
pub trait ConfigSource: Send + Sync {
    fn get_value(&self, key: &str) -> Option<String>;
}

/// Reads the process environment on every lookup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get_value(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// In-process source, updated at runtime through [`StaticConfigSource::set`].
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    values: RwLock<HashMap<String, String>>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl ConfigSource for StaticConfigSource {
    fn get_value(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

/// Current similarity threshold, falling back to `default` when the source has
/// no value or the value is not a number in `0.0..=1.0`.
pub fn live_similarity_threshold(source: &dyn ConfigSource, default: f32) -> f32 {
    let Some(raw) = source.get_value(SIMILARITY_THRESHOLD_KEY) else {
        return default;
    };

    match raw.trim().parse::<f32>() {
        Ok(value) if (0.0..=1.0).contains(&value) => value,
        Ok(value) => {
            tracing::warn!(
                value,
                key = SIMILARITY_THRESHOLD_KEY,
                "Similarity threshold out of range, using default {}",
                default
            );
            default
        }
        Err(e) => {
            tracing::warn!(
                raw = %raw,
                key = SIMILARITY_THRESHOLD_KEY,
                error = %e,
                "Invalid similarity threshold, using default {}",
                default
            );
            default
        }
    }
}

/// Current multi-document threshold. Values below 2 cannot describe an
/// ambiguous set and fall back to `default`.
pub fn live_multi_doc_threshold(source: &dyn ConfigSource, default: usize) -> usize {
    let Some(raw) = source.get_value(MULTI_DOC_THRESHOLD_KEY) else {
        return default;
    };

    match raw.trim().parse::<usize>() {
        Ok(value) if value >= 2 => value,
        _ => {
            tracing::warn!(
                raw = %raw,
                key = MULTI_DOC_THRESHOLD_KEY,
                "Invalid multi-document threshold, using default {}",
                default
            );
            default
        }
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "local"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}
