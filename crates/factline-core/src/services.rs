//! Collaborator contracts consumed by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{AtomicTask, CandidateMap};
use crate::payload::{Decomposition, Extraction, MergeDecision, OrchestrationPlan};

#[derive(Debug, Error)]
/// Enumerates supported `EmbeddingError` values.
pub enum EmbeddingError {
    #[error("embedding provider misconfigured: {0}")]
    Config(String),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
/// Enumerates supported `IndexError` values.
pub enum IndexError {
    #[error("vector index storage error: {0}")]
    Storage(String),
    #[error("vector index entry is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
/// Enumerates supported `LlmError` values.
pub enum LlmError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// Pure function from text to a fixed-length vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimensions(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `Collection` values.
pub enum Collection {
    Documents,
    Facts,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Facts => "facts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `FieldType` values.
pub enum FieldType {
    Summary,
    Keywords,
    PromptText,
    Keyword,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Keywords => "keywords",
            Self::PromptText => "prompt_text",
            Self::Keyword => "keyword",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "summary" => Some(Self::Summary),
            "keywords" => Some(Self::Keywords),
            "prompt_text" => Some(Self::PromptText),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metadata vector written on behalf of a Document or Fact.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub collection: Collection,
    pub owner_id: i64,
    pub field_type: FieldType,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub owner_id: i64,
    pub field_type: FieldType,
    pub text: String,
    /// Cosine distance, `1 - similarity`.
    pub distance: f32,
}

/// Partitioned nearest-neighbor index over metadata vectors.
pub trait VectorIndex: Send + Sync {
    /// Adds entries, skipping keys that already exist. Returns the number written.
    fn add(&self, entries: &[IndexEntry]) -> Result<usize, IndexError>;

    /// Returns up to `k` hits per query vector, merged and sorted by ascending distance.
    fn query(
        &self,
        collection: Collection,
        vectors: &[Vec<f32>],
        field_types: &[FieldType],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError>;

    fn count(&self, collection: Collection) -> Result<usize, IndexError>;

    fn clear(&self) -> Result<(), IndexError>;
}

/// Black-box language model service with strict request/response shapes.
pub trait LlmGateway: Send + Sync {
    fn decompose(&self, query_text: &str) -> Result<Decomposition, LlmError>;

    fn orchestrate(
        &self,
        query_text: &str,
        tasks: &[AtomicTask],
        candidates: &CandidateMap,
    ) -> Result<OrchestrationPlan, LlmError>;

    fn extract(&self, prompt: &str, context_chunks: &[String]) -> Result<Extraction, LlmError>;

    fn translate(
        &self,
        value: &Value,
        target_language: &str,
        source_language: &str,
    ) -> Result<Value, LlmError>;

    fn merge_on_new_evidence(
        &self,
        prompt: &str,
        current_base: &Value,
        new_context: &[String],
        base_language: &str,
    ) -> Result<MergeDecision, LlmError>;
}
