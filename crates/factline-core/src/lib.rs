//! Shared domain model and collaborator contracts for Factline crates.
//!
//! Defines the Document, Fact, Query, and Link records, the explicit
//! per-language [`FactContent`] value, the payloads exchanged with the LLM
//! gateway, and the `Embedder`, `VectorIndex`, and `LlmGateway` traits the
//! engine consumes.

pub mod content;
pub mod model;
pub mod payload;
pub mod services;
pub mod similarity;
pub mod time_utils;

pub use content::{error_value, is_error_value, FactContent};
pub use model::{
    AtomicTask, CandidateMap, Document, DocumentId, Fact, FactId, FactStatus, Link, Query,
    QueryId, SourceDocument, StrongCandidate,
};
pub use payload::{
    Decomposition, Extraction, MergeDecision, OrchestrationPlan, PlaceholderSpec, SpecAction,
};
pub use services::{
    Collection, Embedder, EmbeddingError, FieldType, IndexEntry, IndexError, IndexHit, LlmError,
    LlmGateway, VectorIndex,
};
pub use similarity::{
    cosine_similarity, embed_text_vector, keyword_set_similarity, text_similarity, HashEmbedder,
};
pub use time_utils::current_unix_timestamp_ms;
