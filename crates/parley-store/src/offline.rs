//! Per-user queue of direct messages awaiting the recipient's next login.

use chrono::Utc;
use parley_shared::types::ChatMessage;
use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::Result;
use crate::messages::write_message;

impl Database {
    pub fn enqueue_offline(&self, username: &str, message: &ChatMessage) -> Result<()> {
        write_queued(self.conn(), username, message)
    }

    /// Log a direct message and, when `queue_for` names a recipient, queue it
    /// for them. Both rows commit together or not at all.
    pub fn append_direct(&mut self, message: &ChatMessage, queue_for: Option<&str>) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        write_message(&tx, message)?;
        if let Some(username) = queue_for {
            write_queued(&tx, username, message)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Read and clear a user's queue in one transaction, in enqueue order.
    pub fn drain_offline(&mut self, username: &str) -> Result<Vec<ChatMessage>> {
        let tx = self.conn_mut().transaction()?;
        let payloads = {
            let mut stmt = tx.prepare(
                "SELECT payload FROM offline_queue WHERE username = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![username], |row| row.get::<_, String>(0))?;
            let mut payloads = Vec::new();
            for row in rows {
                payloads.push(row?);
            }
            payloads
        };

        let mut messages = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            messages.push(serde_json::from_str(payload)?);
        }

        tx.execute(
            "DELETE FROM offline_queue WHERE username = ?1",
            params![username],
        )?;
        tx.commit()?;
        Ok(messages)
    }
}

fn write_queued(conn: &Connection, username: &str, message: &ChatMessage) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    conn.execute(
        "INSERT INTO offline_queue (username, payload, queued_at) VALUES (?1, ?2, ?3)",
        params![username, payload, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::tests::direct;
    use crate::users::tests::user;
    use parley_shared::types::{DirectKey, MessageTarget};

    #[test]
    fn drain_returns_in_order_and_clears() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_user(&user("bob")).unwrap();

        db.enqueue_offline("bob", &direct("alice", "bob", "one")).unwrap();
        db.enqueue_offline("bob", &direct("carol", "bob", "two")).unwrap();

        let drained = db.drain_offline("bob").unwrap();
        let contents: Vec<_> = drained.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert!(db.drain_offline("bob").unwrap().is_empty());
    }

    #[test]
    fn queue_requires_known_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.enqueue_offline("ghost", &direct("alice", "ghost", "x")).is_err());
    }

    #[test]
    fn append_direct_logs_and_queues_together() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice")).unwrap();
        db.insert_user(&user("bob")).unwrap();
        let channel = MessageTarget::Direct(DirectKey::new("alice", "bob"));

        db.append_direct(&direct("alice", "bob", "live"), None).unwrap();
        db.append_direct(&direct("alice", "bob", "later"), Some("bob"))
            .unwrap();

        let log = db.recent_messages(&channel, 10).unwrap();
        assert_eq!(log.len(), 2);
        let queued = db.drain_offline("bob").unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].content, "later");
    }

    #[test]
    fn failed_queue_write_rolls_back_log_row() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice")).unwrap();
        db.insert_user(&user("bob")).unwrap();

        // The queue row violates the users foreign key, so the whole append fails.
        let err = db.append_direct(&direct("alice", "bob", "hi"), Some("ghost"));
        assert!(err.is_err());

        let log = db
            .recent_messages(&MessageTarget::Direct(DirectKey::new("alice", "bob")), 10)
            .unwrap();
        assert!(log.is_empty());
    }
}
