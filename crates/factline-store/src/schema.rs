use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::StoreError;

/// Open SQLite fact store connection with WAL pragmas and busy timeout.
pub(crate) fn open_fact_store_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(connection)
}

/// Ensure fact store schema and indexes exist before reads/writes.
pub(crate) fn initialize_fact_store_schema(connection: &Connection) -> Result<(), StoreError> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_url TEXT NOT NULL UNIQUE,
            publication_date TEXT,
            raw_content TEXT NOT NULL,
            summary TEXT NOT NULL,
            keywords_json TEXT NOT NULL,
            processed_unix_ms INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prompt TEXT NOT NULL UNIQUE,
            base_language TEXT NOT NULL,
            is_translatable INTEGER NOT NULL,
            content_json TEXT NOT NULL,
            keywords_json TEXT NOT NULL,
            status TEXT NOT NULL,
            update_count INTEGER NOT NULL DEFAULT 0,
            updated_unix_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_facts_status ON facts(status);
        CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_text TEXT NOT NULL,
            subscribed INTEGER NOT NULL DEFAULT 1,
            language TEXT,
            render_plan_json TEXT,
            final_answer TEXT,
            answer_updated_unix_ms INTEGER,
            answer_revision INTEGER NOT NULL DEFAULT 0,
            created_unix_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queries_answer_revision
            ON queries(answer_revision);
        CREATE TABLE IF NOT EXISTS fact_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_id INTEGER NOT NULL REFERENCES queries(id) ON DELETE CASCADE,
            fact_id INTEGER NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
            placeholder TEXT NOT NULL,
            UNIQUE(query_id, placeholder)
        );
        CREATE INDEX IF NOT EXISTS idx_fact_links_fact ON fact_links(fact_id);
        CREATE TABLE IF NOT EXISTS answer_sequence (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO answer_sequence (id, value) VALUES (1, 0);
        "#,
    )?;
    Ok(())
}
