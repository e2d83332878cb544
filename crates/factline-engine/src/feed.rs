//! Pull-based answer polling over the global answer revision sequence.

use rusqlite::Connection;
use serde::Serialize;

use factline_core::QueryId;
use factline_store::queries;

use crate::EngineError;

pub const DEFAULT_FEED_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerUpdate {
    pub query_id: QueryId,
    pub query_text: String,
    pub answer: String,
    pub answer_revision: u64,
    pub answer_updated_unix_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeed {
    pub updates: Vec<AnswerUpdate>,
    /// Pass back as the next `cursor`.
    pub next_cursor: u64,
}

/// Subscribed answers written after `cursor`, oldest first.
///
/// With no updates the cursor is clamped to the current revision, so a
/// cursor held across a store reset catches up on the next write.
pub(crate) fn answers_since(
    connection: &Connection,
    cursor: u64,
    limit: usize,
) -> Result<AnswerFeed, EngineError> {
    let updates = queries::subscribed_answers_since(connection, cursor, limit)?
        .into_iter()
        .map(|query| AnswerUpdate {
            query_id: query.id,
            query_text: query.text,
            answer: query.final_answer.unwrap_or_default(),
            answer_revision: query.answer_revision,
            answer_updated_unix_ms: query.answer_updated_unix_ms,
        })
        .collect::<Vec<_>>();
    let next_cursor = match updates.last() {
        Some(update) => update.answer_revision,
        None => cursor.min(queries::current_answer_revision(connection)?),
    };
    Ok(AnswerFeed {
        updates,
        next_cursor,
    })
}
