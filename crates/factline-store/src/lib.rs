//! SQLite persistence for Factline documents, Facts, Queries, and Links.
//!
//! Record functions take a `&Connection` so the engine can run them inside
//! one `rusqlite::Transaction` per top-level action. Vector metadata lives in
//! a separate [`SqliteVectorIndex`] file or the [`InMemoryVectorIndex`].

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use thiserror::Error;

pub mod documents;
pub mod facts;
pub mod links;
pub mod queries;
mod schema;
pub mod snapshot;
pub mod vector_index;

pub use snapshot::{export_snapshot, StoreSnapshot};
pub use vector_index::{InMemoryVectorIndex, SqliteVectorIndex};

#[derive(Debug, Error)]
/// Enumerates supported `StoreError` values.
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Public struct `FactStore` owning the relational connection.
pub struct FactStore {
    connection: Connection,
    path: Option<PathBuf>,
}

impl FactStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let connection = schema::open_fact_store_connection(path)?;
        schema::initialize_fact_store_schema(&connection)?;
        tracing::debug!(path = %path.display(), "opened fact store");
        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize_fact_store_schema(&connection)?;
        Ok(Self {
            connection,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Starts a transaction. Dropping it without `commit` rolls every write back.
    pub fn begin(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self.connection.transaction()?)
    }

    /// Deletes every record and restarts the answer revision sequence.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        let transaction = self.connection.transaction()?;
        transaction.execute_batch(
            r#"
            DELETE FROM fact_links;
            DELETE FROM queries;
            DELETE FROM facts;
            DELETE FROM documents;
            UPDATE answer_sequence SET value = 0 WHERE id = 1;
            DELETE FROM sqlite_sequence
                WHERE name IN ('fact_links', 'queries', 'facts', 'documents');
            "#,
        )?;
        transaction.commit()?;
        tracing::info!("fact store reset");
        Ok(())
    }
}

pub(crate) fn encode_string_list(values: &[String]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(values)?)
}

pub(crate) fn decode_string_list(raw: &str) -> Result<Vec<String>, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn to_sql_ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_sql_ms(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
