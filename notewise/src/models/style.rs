use serde::{Deserialize, Serialize};

/// A named system prompt, optionally pinned to a specific model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub key: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub model_override: Option<String>,
}
