use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use factline_core::{Query, QueryId};

use crate::{from_sql_ms, to_sql_ms, StoreError};

const QUERY_COLUMNS: &str = "id, query_text, subscribed, language, render_plan_json, final_answer, answer_updated_unix_ms, answer_revision, created_unix_ms";

/// Inserts a subscribed Query with no plan or answer yet.
pub fn insert_query(
    connection: &Connection,
    text: &str,
    now_unix_ms: u64,
) -> Result<QueryId, StoreError> {
    connection.execute(
        r#"
        INSERT INTO queries (query_text, subscribed, created_unix_ms)
        VALUES (?1, 1, ?2)
        "#,
        params![text, to_sql_ms(now_unix_ms)],
    )?;
    Ok(QueryId(connection.last_insert_rowid()))
}

pub fn load_query(connection: &Connection, id: QueryId) -> Result<Option<Query>, StoreError> {
    let raw = connection
        .query_row(
            &format!("SELECT {QUERY_COLUMNS} FROM queries WHERE id = ?1"),
            params![id.get()],
            RawQuery::from_row,
        )
        .optional()?;
    raw.map(RawQuery::into_query).transpose()
}

pub fn list_queries(connection: &Connection) -> Result<Vec<Query>, StoreError> {
    let mut statement =
        connection.prepare(&format!("SELECT {QUERY_COLUMNS} FROM queries ORDER BY id ASC"))?;
    let rows = statement.query_map([], RawQuery::from_row)?;
    let mut queries = Vec::new();
    for row in rows {
        queries.push(row?.into_query()?);
    }
    Ok(queries)
}

/// Replaces the text and clears the plan so the query is rebuilt from scratch.
pub fn update_query_text(
    connection: &Connection,
    id: QueryId,
    text: &str,
) -> Result<bool, StoreError> {
    let changed = connection.execute(
        r#"
        UPDATE queries
        SET query_text = ?2, render_plan_json = NULL, language = NULL
        WHERE id = ?1
        "#,
        params![id.get(), text],
    )?;
    Ok(changed > 0)
}

pub fn set_query_plan(
    connection: &Connection,
    id: QueryId,
    language: &str,
    render_plan: &Value,
) -> Result<(), StoreError> {
    let changed = connection.execute(
        "UPDATE queries SET language = ?2, render_plan_json = ?3 WHERE id = ?1",
        params![id.get(), language, serde_json::to_string(render_plan)?],
    )?;
    if changed == 0 {
        return Err(StoreError::Corrupt(format!("query {id} does not exist")));
    }
    Ok(())
}

pub fn set_subscription(
    connection: &Connection,
    id: QueryId,
    subscribed: bool,
) -> Result<bool, StoreError> {
    let changed = connection.execute(
        "UPDATE queries SET subscribed = ?2 WHERE id = ?1",
        params![id.get(), subscribed],
    )?;
    Ok(changed > 0)
}

/// Stores an assembled answer stamped with the next answer revision.
pub fn store_answer(
    connection: &Connection,
    id: QueryId,
    answer: &str,
    now_unix_ms: u64,
) -> Result<u64, StoreError> {
    let revision = next_answer_revision(connection)?;
    let changed = connection.execute(
        r#"
        UPDATE queries
        SET final_answer = ?2,
            answer_updated_unix_ms = ?3,
            answer_revision = ?4
        WHERE id = ?1
        "#,
        params![id.get(), answer, to_sql_ms(now_unix_ms), to_sql_ms(revision)],
    )?;
    if changed == 0 {
        return Err(StoreError::Corrupt(format!("query {id} does not exist")));
    }
    Ok(revision)
}

pub fn current_answer_revision(connection: &Connection) -> Result<u64, StoreError> {
    let value: i64 = connection.query_row(
        "SELECT value FROM answer_sequence WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(from_sql_ms(value))
}

fn next_answer_revision(connection: &Connection) -> Result<u64, StoreError> {
    connection.execute("UPDATE answer_sequence SET value = value + 1 WHERE id = 1", [])?;
    current_answer_revision(connection)
}

/// Subscribed queries whose answer revision is newer than `cursor`, oldest first.
pub fn subscribed_answers_since(
    connection: &Connection,
    cursor: u64,
    limit: usize,
) -> Result<Vec<Query>, StoreError> {
    let mut statement = connection.prepare(&format!(
        r#"
        SELECT {QUERY_COLUMNS}
        FROM queries
        WHERE subscribed = 1 AND answer_revision > ?1
        ORDER BY answer_revision ASC
        LIMIT ?2
        "#
    ))?;
    let rows = statement.query_map(
        params![to_sql_ms(cursor), i64::try_from(limit).unwrap_or(i64::MAX)],
        RawQuery::from_row,
    )?;
    let mut queries = Vec::new();
    for row in rows {
        queries.push(row?.into_query()?);
    }
    Ok(queries)
}

struct RawQuery {
    id: i64,
    text: String,
    subscribed: bool,
    language: Option<String>,
    render_plan_json: Option<String>,
    final_answer: Option<String>,
    answer_updated_unix_ms: Option<i64>,
    answer_revision: i64,
    created_unix_ms: i64,
}

impl RawQuery {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            subscribed: row.get(2)?,
            language: row.get(3)?,
            render_plan_json: row.get(4)?,
            final_answer: row.get(5)?,
            answer_updated_unix_ms: row.get(6)?,
            answer_revision: row.get(7)?,
            created_unix_ms: row.get(8)?,
        })
    }

    fn into_query(self) -> Result<Query, StoreError> {
        // Plans that do not decode are kept as raw strings for the assembler's fallback.
        let render_plan = self.render_plan_json.map(|raw| {
            serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
        });
        Ok(Query {
            id: QueryId(self.id),
            text: self.text,
            subscribed: self.subscribed,
            language: self.language,
            render_plan,
            final_answer: self.final_answer,
            answer_updated_unix_ms: self.answer_updated_unix_ms.map(from_sql_ms),
            answer_revision: from_sql_ms(self.answer_revision),
            created_unix_ms: from_sql_ms(self.created_unix_ms),
        })
    }
}
