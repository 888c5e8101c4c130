use chrono::{DateTime, Utc};
use parley_shared::types::{ChatMessage, MessageTarget};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Append a message to its target's log.
    pub fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        write_message(self.conn(), message)
    }

    /// The last `limit` messages of a log, oldest first.
    pub fn recent_messages(&self, target: &MessageTarget, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, target_type, recipient, kind, content, filename, data_base64, timestamp
             FROM (
                SELECT * FROM messages
                WHERE channel = ?1
                ORDER BY seq DESC
                LIMIT ?2
             )
             ORDER BY seq ASC",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![target.channel_key(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

/// Insert one log row on `conn`, which may be an open transaction.
pub(crate) fn write_message(conn: &Connection, message: &ChatMessage) -> Result<()> {
    let target = message
        .target()
        .ok_or_else(|| StoreError::Corrupt(format!("message target {:?}", message.to)))?;
    conn.execute(
        "INSERT INTO messages
            (id, channel, sender, target_type, recipient, kind, content, filename, data_base64, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message.id.to_string(),
            target.channel_key(),
            message.from,
            message.target_type.as_str(),
            message.to,
            message.kind.as_str(),
            message.content,
            message.filename,
            message.data_base64,
            message.ts.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let target_str: String = row.get(2)?;
    let kind_str: String = row.get(4)?;
    let ts_str: String = row.get(8)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let target_type = target_str
        .parse()
        .map_err(|e: String| conversion_error(2, StoreError::Corrupt(e)))?;
    let kind = kind_str
        .parse()
        .map_err(|e: String| conversion_error(4, StoreError::Corrupt(e)))?;
    let ts: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(8, e))?;

    Ok(ChatMessage {
        id,
        from: row.get(1)?,
        target_type,
        to: row.get(3)?,
        kind,
        content: row.get(5)?,
        filename: row.get(6)?,
        data_base64: row.get(7)?,
        ts,
    })
}
