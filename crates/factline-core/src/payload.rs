//! Typed payloads exchanged with the LLM gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{AtomicTask, FactId};

pub const DEFAULT_LANGUAGE: &str = "en";

/// Result of splitting a query into atomic tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub user_language: String,
    pub tasks: Vec<AtomicTask>,
}

impl Default for Decomposition {
    fn default() -> Self {
        Self {
            user_language: DEFAULT_LANGUAGE.to_string(),
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpecAction {
    Reuse { fact_id: FactId },
    Create { prompt: String, keywords: Vec<String> },
}

/// How one render-plan placeholder gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderSpec {
    pub placeholder: String,
    pub action: SpecAction,
}

/// Render plan plus per-placeholder reuse/create decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub render_plan: Vec<Value>,
    pub specs: Vec<PlaceholderSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub is_translatable: bool,
    pub data: Value,
}

/// Outcome of re-evaluating a Fact against new evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeDecision {
    Update { data: Value, is_translatable: bool },
    NoChange,
    Error { message: String },
}

impl MergeDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::NoChange => "no_change",
            Self::Error { .. } => "error",
        }
    }
}
