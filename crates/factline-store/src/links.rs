use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};

use factline_core::{FactId, Link, QueryId};

use crate::StoreError;

/// Links a placeholder to a Fact. The last write for a placeholder wins;
/// returns the Fact it replaced, if any.
pub fn upsert_link(
    connection: &Connection,
    query_id: QueryId,
    fact_id: FactId,
    placeholder: &str,
) -> Result<Option<FactId>, StoreError> {
    let previous = connection
        .query_row(
            "SELECT fact_id FROM fact_links WHERE query_id = ?1 AND placeholder = ?2",
            params![query_id.get(), placeholder],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(FactId);
    connection.execute(
        r#"
        INSERT INTO fact_links (query_id, fact_id, placeholder)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(query_id, placeholder)
        DO UPDATE SET fact_id = excluded.fact_id
        "#,
        params![query_id.get(), fact_id.get(), placeholder],
    )?;
    Ok(previous)
}

pub fn delete_links_for_query(connection: &Connection, query_id: QueryId) -> Result<usize, StoreError> {
    Ok(connection.execute(
        "DELETE FROM fact_links WHERE query_id = ?1",
        params![query_id.get()],
    )?)
}

pub fn links_for_query(connection: &Connection, query_id: QueryId) -> Result<Vec<Link>, StoreError> {
    let mut statement = connection.prepare(
        r#"
        SELECT query_id, fact_id, placeholder
        FROM fact_links
        WHERE query_id = ?1
        ORDER BY id ASC
        "#,
    )?;
    let rows = statement.query_map(params![query_id.get()], |row| {
        Ok(Link {
            query_id: QueryId(row.get(0)?),
            fact_id: FactId(row.get(1)?),
            placeholder: row.get(2)?,
        })
    })?;
    let mut links = Vec::new();
    for row in rows {
        links.push(row?);
    }
    Ok(links)
}

pub fn list_links(connection: &Connection) -> Result<Vec<Link>, StoreError> {
    let mut statement = connection.prepare(
        "SELECT query_id, fact_id, placeholder FROM fact_links ORDER BY query_id ASC, id ASC",
    )?;
    let rows = statement.query_map([], |row| {
        Ok(Link {
            query_id: QueryId(row.get(0)?),
            fact_id: FactId(row.get(1)?),
            placeholder: row.get(2)?,
        })
    })?;
    let mut links = Vec::new();
    for row in rows {
        links.push(row?);
    }
    Ok(links)
}

/// Distinct Queries linked to any of `fact_ids`, in ascending id order.
pub fn query_ids_for_facts(
    connection: &Connection,
    fact_ids: &[FactId],
) -> Result<Vec<QueryId>, StoreError> {
    let mut statement =
        connection.prepare("SELECT DISTINCT query_id FROM fact_links WHERE fact_id = ?1")?;
    let mut query_ids = BTreeSet::new();
    for fact_id in fact_ids {
        let rows = statement.query_map(params![fact_id.get()], |row| row.get::<_, i64>(0))?;
        for row in rows {
            query_ids.insert(QueryId(row?));
        }
    }
    Ok(query_ids.into_iter().collect())
}
