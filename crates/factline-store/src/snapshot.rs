use rusqlite::Connection;
use serde::Serialize;

use factline_core::{Document, Fact, Link, Query};

use crate::{documents, facts, links, queries, StoreError};

/// Full relational dump used by operators to inspect the cache.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub answer_revision: u64,
    pub documents: Vec<Document>,
    pub facts: Vec<Fact>,
    pub queries: Vec<Query>,
    pub links: Vec<Link>,
}

pub fn export_snapshot(connection: &Connection) -> Result<StoreSnapshot, StoreError> {
    Ok(StoreSnapshot {
        answer_revision: queries::current_answer_revision(connection)?,
        documents: documents::list_documents(connection)?,
        facts: facts::list_facts(connection)?,
        queries: queries::list_queries(connection)?,
        links: links::list_links(connection)?,
    })
}
