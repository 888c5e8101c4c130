//! CRUD operations for rooms and room membership.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_shared::types::{MessageTarget, RoomId};
use rusqlite::params;

use crate::database::Database;
use crate::error::{map_constraint, Result, StoreError};
use crate::models::{MembershipChange, RoomRecord};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a room together with its initial members, atomically.
    pub fn insert_room(&mut self, room: &RoomRecord) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO rooms (id, name, owner, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                room.id.to_string(),
                room.name,
                room.owner,
                room.created_at.to_rfc3339(),
            ],
        )
        .map_err(map_constraint)?;
        for member in &room.members {
            tx.execute(
                "INSERT INTO room_members (room_id, username, joined_at) VALUES (?1, ?2, ?3)",
                params![room.id.to_string(), member, room.created_at.to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    pub fn apply_membership_change(&mut self, change: &MembershipChange) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        match change {
            MembershipChange::Join { room, username } => {
                tx.execute(
                    "INSERT OR IGNORE INTO room_members (room_id, username, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![room.to_string(), username, Utc::now().to_rfc3339()],
                )?;
            }
            MembershipChange::Leave { room, username } => {
                tx.execute(
                    "DELETE FROM room_members WHERE room_id = ?1 AND username = ?2",
                    params![room.to_string(), username],
                )?;
            }
            MembershipChange::Delete { room } => {
                tx.execute(
                    "DELETE FROM messages WHERE channel = ?1",
                    params![MessageTarget::Room(*room).channel_key()],
                )?;
                let affected =
                    tx.execute("DELETE FROM rooms WHERE id = ?1", params![room.to_string()])?;
                if affected == 0 {
                    return Err(StoreError::NotFound);
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// List every room with its members, ordered by name.
    pub fn list_rooms(&self) -> Result<Vec<RoomRecord>> {
        let mut members: HashMap<String, Vec<String>> = HashMap::new();
        {
            let mut stmt = self.conn().prepare(
                "SELECT room_id, username FROM room_members ORDER BY room_id, username",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (room_id, username) = row?;
                members.entry(room_id).or_default().push(username);
            }
        }

        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, owner, created_at FROM rooms ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            let (id_str, name, owner, created_str) = row?;
            let id: RoomId = id_str
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("room id {id_str:?}: {e}")))?;
            let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Corrupt(format!("room created_at: {e}")))?;
            rooms.push(RoomRecord {
                id,
                name,
                owner,
                members: members.remove(&id_str).unwrap_or_default(),
                created_at,
            });
        }
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::user;

    fn room(owner: &str, name: &str) -> RoomRecord {
        RoomRecord {
            id: RoomId::new(),
            name: name.into(),
            owner: owner.into(),
            members: vec![owner.into()],
            created_at: Utc::now(),
        }
    }

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice")).unwrap();
        db.insert_user(&user("bob")).unwrap();
        db
    }

    #[test]
    fn create_join_leave() {
        let mut db = setup();
        let team = room("alice", "Team");
        db.insert_room(&team).unwrap();

        db.apply_membership_change(&MembershipChange::Join {
            room: team.id,
            username: "bob".into(),
        })
        .unwrap();
        let rooms = db.list_rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].members, vec!["alice", "bob"]);

        db.apply_membership_change(&MembershipChange::Leave {
            room: team.id,
            username: "alice".into(),
        })
        .unwrap();
        assert_eq!(db.list_rooms().unwrap()[0].members, vec!["bob"]);
    }

    #[test]
    fn delete_drops_room_and_members() {
        let mut db = setup();
        let team = room("alice", "Team");
        db.insert_room(&team).unwrap();

        db.apply_membership_change(&MembershipChange::Delete { room: team.id })
            .unwrap();
        assert!(db.list_rooms().unwrap().is_empty());

        let members: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM room_members", [], |row| row.get(0))
            .unwrap();
        assert_eq!(members, 0);

        assert!(matches!(
            db.apply_membership_change(&MembershipChange::Delete { room: team.id }),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn failed_room_insert_is_rolled_back() {
        let mut db = setup();
        let mut bad = room("alice", "Broken");
        bad.members.push("ghost".into());

        assert!(db.insert_room(&bad).is_err());
        assert!(db.list_rooms().unwrap().is_empty());
    }
}
