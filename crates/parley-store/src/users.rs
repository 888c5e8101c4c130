//! CRUD operations for [`UserRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{map_constraint, Result, StoreError};
use crate::models::UserRecord;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new account. Fails with [`StoreError::AlreadyExists`] if the
    /// username is taken.
    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (username, display_name, password_salt, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.username,
                    user.display_name,
                    user.password_salt,
                    user.password_hash,
                    user.created_at.to_rfc3339(),
                ],
            )
            .map_err(map_constraint)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn find_user(&self, username: &str) -> Result<UserRecord> {
        self.conn()
            .query_row(
                "SELECT username, display_name, password_salt, password_hash, created_at
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List every account, ordered by username.
    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT username, display_name, password_salt, password_hash, created_at
             FROM users
             ORDER BY username ASC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let created_str: String = row.get(4)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserRecord {
        username: row.get(0)?,
        display_name: row.get(1)?,
        password_salt: row.get(2)?,
        password_hash: row.get(3)?,
        created_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn user(name: &str) -> UserRecord {
        UserRecord {
            username: name.to_string(),
            display_name: name.to_uppercase(),
            password_salt: "00".repeat(16),
            password_hash: "11".repeat(32),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice")).unwrap();

        let found = db.find_user("alice").unwrap();
        assert_eq!(found.display_name, "ALICE");
        assert!(matches!(db.find_user("bob"), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice")).unwrap();
        assert!(matches!(
            db.insert_user(&user("alice")),
            Err(StoreError::AlreadyExists)
        ));
    }

    #[test]
    fn list_is_sorted() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("carol")).unwrap();
        db.insert_user(&user("alice")).unwrap();
        let names: Vec<_> = db.list_users().unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }
}
