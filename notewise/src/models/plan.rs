use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Search,
    Select,
    Switch,
    AnswerCurrent,
    AnswerAll,
    Clarify,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => write!(f, "SEARCH"),
            Self::Select => write!(f, "SELECT"),
            Self::Switch => write!(f, "SWITCH"),
            Self::AnswerCurrent => write!(f, "ANSWER_CURRENT"),
            Self::AnswerAll => write!(f, "ANSWER_ALL"),
            Self::Clarify => write!(f, "CLARIFY"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "SEARCH" => Ok(Self::Search),
            "SELECT" => Ok(Self::Select),
            "SWITCH" => Ok(Self::Switch),
            "ANSWER_CURRENT" => Ok(Self::AnswerCurrent),
            "ANSWER_ALL" => Ok(Self::AnswerAll),
            "CLARIFY" => Ok(Self::Clarify),
            other => Err(format!("Unknown action '{other}'")),
        }
    }
}

/// Classified intent of a turn. Variant payloads exist only where the action
/// needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Search { query: String },
    Select { target_index: usize },
    Switch { target_index: usize },
    AnswerCurrent,
    AnswerAll,
    Clarify,
}

impl PlanAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Search { .. } => ActionKind::Search,
            Self::Select { .. } => ActionKind::Select,
            Self::Switch { .. } => ActionKind::Switch,
            Self::AnswerCurrent => ActionKind::AnswerCurrent,
            Self::AnswerAll => ActionKind::AnswerAll,
            Self::Clarify => ActionKind::Clarify,
        }
    }

    pub fn search_query(&self) -> Option<&str> {
        match self {
            Self::Search { query } => Some(query),
            _ => None,
        }
    }

    pub fn target_index(&self) -> Option<usize> {
        match self {
            Self::Select { target_index } | Self::Switch { target_index } => Some(*target_index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub action: PlanAction,
    pub reasoning: String,
}

impl ActionPlan {
    pub fn new(action: PlanAction, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
        }
    }

    pub fn clarify(reasoning: impl Into<String>) -> Self {
        Self::new(PlanAction::Clarify, reasoning)
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}
