use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use factline_core::{Fact, FactContent, FactId, FactStatus};

use crate::{decode_string_list, encode_string_list, from_sql_ms, to_sql_ms, StoreError};

const FACT_COLUMNS: &str = "id, prompt, base_language, is_translatable, content_json, keywords_json, status, update_count, updated_unix_ms";

/// Inserts a new FULFILLED Fact. Fails on a duplicate prompt.
pub fn insert_fact(
    connection: &Connection,
    prompt: &str,
    content: &FactContent,
    keywords: &[String],
    now_unix_ms: u64,
) -> Result<FactId, StoreError> {
    connection.execute(
        r#"
        INSERT INTO facts (
            prompt,
            base_language,
            is_translatable,
            content_json,
            keywords_json,
            status,
            update_count,
            updated_unix_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
        "#,
        params![
            prompt,
            content.base_language,
            content.is_translatable,
            serde_json::to_string(content.entries())?,
            encode_string_list(keywords)?,
            FactStatus::Fulfilled.as_str(),
            to_sql_ms(now_unix_ms),
        ],
    )?;
    Ok(FactId(connection.last_insert_rowid()))
}

pub fn load_fact(connection: &Connection, id: FactId) -> Result<Option<Fact>, StoreError> {
    let raw = connection
        .query_row(
            &format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1"),
            params![id.get()],
            RawFact::from_row,
        )
        .optional()?;
    raw.map(RawFact::into_fact).transpose()
}

pub fn find_fact_by_prompt(connection: &Connection, prompt: &str) -> Result<Option<Fact>, StoreError> {
    let raw = connection
        .query_row(
            &format!("SELECT {FACT_COLUMNS} FROM facts WHERE prompt = ?1"),
            params![prompt],
            RawFact::from_row,
        )
        .optional()?;
    raw.map(RawFact::into_fact).transpose()
}

pub fn list_facts(connection: &Connection) -> Result<Vec<Fact>, StoreError> {
    let mut statement =
        connection.prepare(&format!("SELECT {FACT_COLUMNS} FROM facts ORDER BY id ASC"))?;
    let rows = statement.query_map([], RawFact::from_row)?;
    let mut facts = Vec::new();
    for row in rows {
        facts.push(row?.into_fact()?);
    }
    Ok(facts)
}

/// Persists a merged base value: bumps the update counter and the timestamp.
pub fn save_merged_content(
    connection: &Connection,
    id: FactId,
    content: &FactContent,
    now_unix_ms: u64,
) -> Result<(), StoreError> {
    let changed = connection.execute(
        r#"
        UPDATE facts
        SET base_language = ?2,
            is_translatable = ?3,
            content_json = ?4,
            update_count = update_count + 1,
            updated_unix_ms = ?5
        WHERE id = ?1
        "#,
        params![
            id.get(),
            content.base_language,
            content.is_translatable,
            serde_json::to_string(content.entries())?,
            to_sql_ms(now_unix_ms),
        ],
    )?;
    ensure_fact_row_changed(changed, id)
}

/// Persists cached translations only. The update counter and timestamp are untouched.
pub fn save_cached_translations(
    connection: &Connection,
    id: FactId,
    content: &FactContent,
) -> Result<(), StoreError> {
    let changed = connection.execute(
        "UPDATE facts SET content_json = ?2 WHERE id = ?1",
        params![id.get(), serde_json::to_string(content.entries())?],
    )?;
    ensure_fact_row_changed(changed, id)
}

pub fn set_fact_status(
    connection: &Connection,
    id: FactId,
    status: FactStatus,
    now_unix_ms: u64,
) -> Result<(), StoreError> {
    let changed = connection.execute(
        "UPDATE facts SET status = ?2, updated_unix_ms = ?3 WHERE id = ?1",
        params![id.get(), status.as_str(), to_sql_ms(now_unix_ms)],
    )?;
    ensure_fact_row_changed(changed, id)
}

/// FULFILLED Facts that no Query links to.
pub fn unlinked_fulfilled_fact_ids(connection: &Connection) -> Result<Vec<FactId>, StoreError> {
    let mut statement = connection.prepare(
        r#"
        SELECT facts.id
        FROM facts
        LEFT JOIN fact_links ON fact_links.fact_id = facts.id
        WHERE facts.status = ?1 AND fact_links.id IS NULL
        ORDER BY facts.id ASC
        "#,
    )?;
    let rows = statement.query_map(params![FactStatus::Fulfilled.as_str()], |row| {
        row.get::<_, i64>(0)
    })?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(FactId(row?));
    }
    Ok(ids)
}

fn ensure_fact_row_changed(changed: usize, id: FactId) -> Result<(), StoreError> {
    if changed == 0 {
        return Err(StoreError::Corrupt(format!("fact {id} does not exist")));
    }
    Ok(())
}

struct RawFact {
    id: i64,
    prompt: String,
    base_language: String,
    is_translatable: bool,
    content_json: String,
    keywords_json: String,
    status: String,
    update_count: i64,
    updated_unix_ms: i64,
}

impl RawFact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            prompt: row.get(1)?,
            base_language: row.get(2)?,
            is_translatable: row.get(3)?,
            content_json: row.get(4)?,
            keywords_json: row.get(5)?,
            status: row.get(6)?,
            update_count: row.get(7)?,
            updated_unix_ms: row.get(8)?,
        })
    }

    fn into_fact(self) -> Result<Fact, StoreError> {
        let status = FactStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Corrupt(format!("fact {} has unknown status '{}'", self.id, self.status))
        })?;
        let entries = serde_json::from_str::<BTreeMap<String, Value>>(&self.content_json)?;
        Ok(Fact {
            id: FactId(self.id),
            prompt: self.prompt,
            content: FactContent::from_parts(self.base_language, self.is_translatable, entries),
            keywords: decode_string_list(&self.keywords_json)?,
            status,
            update_count: u64::try_from(self.update_count).unwrap_or_default(),
            updated_unix_ms: from_sql_ms(self.updated_unix_ms),
        })
    }
}
