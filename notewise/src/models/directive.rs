use serde::{Deserialize, Serialize};

/// Processing mode for a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Retrieval-augmented answer grounded in the user's notes.
    #[default]
    Rag,
    /// Direct generation, no retrieval.
    Bypass,
    /// Direct generation with a named style applied.
    BypassStyle,
    /// Retrieval-augmented answer with a named style applied.
    RagStyle,
}

impl ChatMode {
    pub fn is_bypass(self) -> bool {
        matches!(self, Self::Bypass | Self::BypassStyle)
    }

    pub fn is_styled(self) -> bool {
        matches!(self, Self::BypassStyle | Self::RagStyle)
    }

    /// The unstyled mode a style variant degrades to.
    pub fn base(self) -> Self {
        match self {
            Self::Rag | Self::RagStyle => Self::Rag,
            Self::Bypass | Self::BypassStyle => Self::Bypass,
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rag => write!(f, "rag"),
            Self::Bypass => write!(f, "bypass"),
            Self::BypassStyle => write!(f, "bypass_style"),
            Self::RagStyle => write!(f, "rag_style"),
        }
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rag" => Ok(Self::Rag),
            "bypass" => Ok(Self::Bypass),
            "bypass_style" => Ok(Self::BypassStyle),
            "rag_style" => Ok(Self::RagStyle),
            other => Err(format!(
                "Invalid mode '{other}'. Valid modes: rag, bypass, bypass_style, rag_style"
            )),
        }
    }
}

/// A mode together with the style key it applies, if any.
///
/// Its string form (`bypass`, `rag_style:tutor`, ...) is what callers persist
/// as the conversation's sticky mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeSelection {
    pub mode: ChatMode,
    pub style_key: Option<String>,
}

impl ModeSelection {
    pub fn new(mode: ChatMode, style_key: Option<String>) -> Self {
        let style_key = if mode.is_styled() {
            style_key.filter(|key| !key.trim().is_empty())
        } else {
            None
        };

        match style_key {
            Some(key) => Self {
                mode,
                style_key: Some(key),
            },
            None => Self {
                mode: mode.base(),
                style_key: None,
            },
        }
    }

    pub fn rag() -> Self {
        Self::default()
    }

    /// Same mode family without the style.
    pub fn unstyled(&self) -> Self {
        Self::new(self.mode.base(), None)
    }
}

impl std::fmt::Display for ModeSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.style_key {
            Some(key) => write!(f, "{}:{}", self.mode, key),
            None => write!(f, "{}", self.mode),
        }
    }
}

impl std::str::FromStr for ModeSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, key) = match s.trim().split_once(':') {
            Some((mode, key)) => (mode.parse::<ChatMode>()?, Some(key.trim().to_string())),
            None => (s.parse::<ChatMode>()?, None),
        };

        if mode.is_styled() && key.as_deref().map_or(true, str::is_empty) {
            return Err(format!("Mode '{mode}' requires a style key"));
        }

        Ok(Self::new(mode, key))
    }
}

/// Result of splitting a raw utterance into mode, style key and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirective {
    pub mode: ChatMode,
    /// Set only for the `*_style` modes.
    pub style_key: Option<String>,
    pub clean_text: String,
    /// A directive prefix was recognized, as opposed to the implicit default.
    pub explicit: bool,
}

impl ParsedDirective {
    pub fn selection(&self) -> ModeSelection {
        ModeSelection::new(self.mode, self.style_key.clone())
    }
}
