//! Friend graph edges.
//!
//! Pending requests are directed rows `(requester, target, 'pending')`.
//! An accepted friendship is a single `'accepted'` row; readers treat it as
//! symmetric.

use chrono::Utc;
use rusqlite::{params, Transaction};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{EdgeChange, EdgeStatus, FriendEdge};

impl Database {
    /// Apply a batch of edge transitions in one transaction.
    pub fn apply_edge_changes(&mut self, changes: &[EdgeChange]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for change in changes {
            apply_one(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_friend_edges(&self) -> Result<Vec<FriendEdge>> {
        let mut stmt = self.conn().prepare(
            "SELECT requester, target, status FROM friend_edges ORDER BY requester, target",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (requester, target, status) = row?;
            let status = EdgeStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown edge status {status:?}")))?;
            edges.push(FriendEdge {
                requester,
                target,
                status,
            });
        }
        Ok(edges)
    }
}

fn apply_one(tx: &Transaction<'_>, change: &EdgeChange) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match change {
        EdgeChange::Request { requester, target } => {
            tx.execute(
                "INSERT OR IGNORE INTO friend_edges (requester, target, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![requester, target, EdgeStatus::Pending.as_str(), now],
            )?;
        }
        EdgeChange::Accept { requester, target } => {
            tx.execute(
                "DELETE FROM friend_edges
                 WHERE (requester = ?1 AND target = ?2) OR (requester = ?2 AND target = ?1)",
                params![requester, target],
            )?;
            tx.execute(
                "INSERT INTO friend_edges (requester, target, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![requester, target, EdgeStatus::Accepted.as_str(), now],
            )?;
        }
        EdgeChange::Decline { requester, target } => {
            tx.execute(
                "DELETE FROM friend_edges
                 WHERE requester = ?1 AND target = ?2 AND status = ?3",
                params![requester, target, EdgeStatus::Pending.as_str()],
            )?;
        }
        EdgeChange::Remove { a, b } => {
            tx.execute(
                "DELETE FROM friend_edges
                 WHERE ((requester = ?1 AND target = ?2) OR (requester = ?2 AND target = ?1))
                   AND status = ?3",
                params![a, b, EdgeStatus::Accepted.as_str()],
            )?;
        }
    }
    Ok(())
}
