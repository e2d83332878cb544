use thiserror::Error;

use factline_core::{EmbeddingError, FactId, IndexError, QueryId};
use factline_store::StoreError;

#[derive(Debug, Error)]
/// Enumerates supported `EngineError` values.
pub enum EngineError {
    #[error("query decomposition produced no tasks")]
    DecompositionFailure,
    #[error("orchestration produced an empty {missing}")]
    OrchestrationFailure { missing: &'static str },
    #[error("placeholder '{placeholder}' reuses unknown fact {fact_id}")]
    UnknownFact { placeholder: String, fact_id: FactId },
    #[error("placeholder '{placeholder}' reuses fact {fact_id} that was not a confirmed candidate")]
    UnconfirmedReuse { placeholder: String, fact_id: FactId },
    #[error("query {0} does not exist")]
    QueryNotFound(QueryId),
    #[error("invalid document source: {0}")]
    Source(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl From<rusqlite::Error> for EngineError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(error))
    }
}
