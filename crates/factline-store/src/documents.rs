use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use factline_core::{Document, DocumentId, SourceDocument};

use crate::{decode_string_list, encode_string_list, from_sql_ms, to_sql_ms, StoreError};

const DOCUMENT_COLUMNS: &str = "id, source_url, publication_date, raw_content, summary, keywords_json, processed_unix_ms";

pub fn document_exists(connection: &Connection, source_url: &str) -> Result<bool, StoreError> {
    let found = connection
        .query_row(
            "SELECT 1 FROM documents WHERE source_url = ?1",
            params![source_url],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Inserts a document. The caller checks for a URL and for duplicates first.
pub fn insert_document(
    connection: &Connection,
    source: &SourceDocument,
    processed_unix_ms: u64,
) -> Result<DocumentId, StoreError> {
    let source_url = source
        .source_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| StoreError::Corrupt("document source url is required".to_string()))?;
    connection.execute(
        r#"
        INSERT INTO documents (
            source_url,
            publication_date,
            raw_content,
            summary,
            keywords_json,
            processed_unix_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            source_url,
            source
                .publication_date
                .map(|date| date.format("%Y-%m-%d").to_string()),
            source.raw_content,
            source.summary,
            encode_string_list(&source.keywords)?,
            to_sql_ms(processed_unix_ms),
        ],
    )?;
    Ok(DocumentId(connection.last_insert_rowid()))
}

pub fn load_document(
    connection: &Connection,
    id: DocumentId,
) -> Result<Option<Document>, StoreError> {
    let raw = connection
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.get()],
            RawDocument::from_row,
        )
        .optional()?;
    raw.map(RawDocument::into_document).transpose()
}

pub fn list_documents(connection: &Connection) -> Result<Vec<Document>, StoreError> {
    let mut statement =
        connection.prepare(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id ASC"))?;
    let rows = statement.query_map([], RawDocument::from_row)?;
    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?.into_document()?);
    }
    Ok(documents)
}

struct RawDocument {
    id: i64,
    source_url: String,
    publication_date: Option<String>,
    raw_content: String,
    summary: String,
    keywords_json: String,
    processed_unix_ms: i64,
}

impl RawDocument {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_url: row.get(1)?,
            publication_date: row.get(2)?,
            raw_content: row.get(3)?,
            summary: row.get(4)?,
            keywords_json: row.get(5)?,
            processed_unix_ms: row.get(6)?,
        })
    }

    fn into_document(self) -> Result<Document, StoreError> {
        let publication_date = self
            .publication_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| {
                    StoreError::Corrupt(format!(
                        "document {} has invalid publication date '{raw}': {error}",
                        self.id
                    ))
                })
            })
            .transpose()?;
        Ok(Document {
            id: DocumentId(self.id),
            source_url: self.source_url,
            publication_date,
            raw_content: self.raw_content,
            summary: self.summary,
            keywords: decode_string_list(&self.keywords_json)?,
            processed_unix_ms: from_sql_ms(self.processed_unix_ms),
        })
    }
}
