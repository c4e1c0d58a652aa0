use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Note store error: {0}")]
    NoteStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Failures of the embedding or generation provider. These are the only
    /// errors the router lets escape a turn.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ChatError::Embedding(_)
                | ChatError::Http(_)
                | ChatError::ApiRateLimit { .. }
                | ChatError::ApiAuth(_)
                | ChatError::Llm(_)
                | ChatError::LlmUnavailable(_)
                | ChatError::LlmRateLimit { .. }
                | ChatError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
