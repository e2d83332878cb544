use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::EngineError;

pub const DEFAULT_REUSE_THRESHOLD: f32 = 0.85;
pub const DEFAULT_LIST_EMPTY_MESSAGE: &str = "No related information was found.";

/// Tunable thresholds and limits for matching, reranking, and assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum exact cosine similarity that authorizes reusing a Fact.
    pub reuse_threshold: f32,
    pub candidate_limit: usize,
    pub context_limit: usize,
    pub rerank_top_k: usize,
    pub rerank_min_pool: usize,
    pub rerank_pool_multiplier: usize,
    pub prompt_weight: f32,
    pub keyword_weight: f32,
    pub keyword_match_threshold: f32,
    pub min_combined_score: f32,
    pub default_language: String,
    pub list_empty_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reuse_threshold: DEFAULT_REUSE_THRESHOLD,
            candidate_limit: 3,
            context_limit: 5,
            rerank_top_k: 10,
            rerank_min_pool: 50,
            rerank_pool_multiplier: 5,
            prompt_weight: 0.7,
            keyword_weight: 0.3,
            keyword_match_threshold: 0.7,
            min_combined_score: 0.1,
            default_language: "en".to_string(),
            list_empty_message: DEFAULT_LIST_EMPTY_MESSAGE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        let config = toml::from_str::<Self>(raw)
            .map_err(|error| EngineError::Config(format!("invalid engine config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            EngineError::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Size of the candidate pool fetched before reranking to `rerank_top_k`.
    pub fn rerank_pool_size(&self) -> usize {
        self.rerank_min_pool
            .max(self.rerank_top_k.saturating_mul(self.rerank_pool_multiplier))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("reuse_threshold", self.reuse_threshold),
            ("keyword_match_threshold", self.keyword_match_threshold),
            ("min_combined_score", self.min_combined_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("prompt_weight", self.prompt_weight),
            ("keyword_weight", self.keyword_weight),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::Config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("candidate_limit", self.candidate_limit),
            ("context_limit", self.context_limit),
            ("rerank_top_k", self.rerank_top_k),
        ] {
            if value == 0 {
                return Err(EngineError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.default_language.trim().is_empty() {
            return Err(EngineError::Config(
                "default_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
