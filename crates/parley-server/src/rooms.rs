//! Room directory: create, join, leave.
//!
//! A room exists only while it has members. The last member leaving deletes
//! the room together with its message log.

use std::collections::BTreeSet;

use chrono::Utc;
use parley_shared::protocol::Push;
use parley_shared::types::{RoomAction, RoomId, RoomSummary};
use parley_store::{MembershipChange, RoomRecord};
use tracing::info;

use crate::error::{ChatError, ChatResult};
use crate::hub::{Hub, RoomEntry};
use crate::sessions::ConnectionHandle;

impl Hub {
    pub async fn create_room(&self, conn: &ConnectionHandle, name: &str) -> ChatResult<RoomSummary> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidRequest("room name must not be empty".into()));
        }

        let mut id = RoomId::new();
        while dir.rooms.contains_key(&id) {
            id = RoomId::new();
        }
        dir.gateway().create_room(&RoomRecord {
            id,
            name: name.to_string(),
            owner: me.clone(),
            members: vec![me.clone()],
            created_at: Utc::now(),
        })?;

        let room = RoomEntry {
            id,
            name: name.to_string(),
            owner: me.clone(),
            members: BTreeSet::from([me.clone()]),
        };
        let summary = room.summary();
        dir.rooms.insert(id, room);
        if let Some(user) = dir.users.get_mut(&me) {
            user.rooms.insert(id);
        }
        info!(room = %id, name, owner = %me, "Room created");

        self.refresh_room_list(&dir, &me).await;
        Ok(summary)
    }

    /// Join a room. Joining a room one already belongs to is a no-op.
    pub async fn join_room(&self, conn: &ConnectionHandle, room_id: &str) -> ChatResult<RoomSummary> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let room = dir.room(room_id)?;
        let (id, summary) = (room.id, room.summary());
        if room.members.contains(&me) {
            return Ok(summary);
        }

        dir.gateway().update_room_membership(&MembershipChange::Join {
            room: id,
            username: me.clone(),
        })?;
        let Some(room) = dir.rooms.get_mut(&id) else {
            return Err(ChatError::RoomNotFound(room_id.to_string()));
        };
        room.members.insert(me.clone());
        let members: Vec<String> = room.members.iter().cloned().collect();
        if let Some(user) = dir.users.get_mut(&me) {
            user.rooms.insert(id);
        }
        info!(room = %id, username = %me, "Joined room");

        let update = Push::RoomUpdate {
            room_id: id,
            name: summary.name.clone(),
            action: RoomAction::Join,
            user: me.clone(),
        };
        self.sessions()
            .route_many(members.iter().map(String::as_str), &update)
            .await;
        self.refresh_room_list(&dir, &me).await;
        Ok(summary)
    }

    /// Leave a room, deleting it if `conn`'s user was the last member.
    pub async fn leave_room(&self, conn: &ConnectionHandle, room_id: &str) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let room = dir.room(room_id)?;
        if !room.members.contains(&me) {
            return Err(ChatError::NotRoomMember(room_id.to_string()));
        }
        let (id, name) = (room.id, room.name.clone());
        let last_member = room.members.len() == 1;

        if last_member {
            dir.gateway()
                .update_room_membership(&MembershipChange::Delete { room: id })?;
            dir.rooms.remove(&id);
        } else {
            dir.gateway().update_room_membership(&MembershipChange::Leave {
                room: id,
                username: me.clone(),
            })?;
            if let Some(room) = dir.rooms.get_mut(&id) {
                room.members.remove(&me);
            }
        }
        if let Some(user) = dir.users.get_mut(&me) {
            user.rooms.remove(&id);
        }

        if last_member {
            info!(room = %id, username = %me, "Last member left, room deleted");
            let update = Push::RoomUpdate {
                room_id: id,
                name,
                action: RoomAction::Delete,
                user: me.clone(),
            };
            self.sessions().route(&me, &update).await;
        } else {
            info!(room = %id, username = %me, "Left room");
            let update = Push::RoomUpdate {
                room_id: id,
                name,
                action: RoomAction::Leave,
                user: me.clone(),
            };
            if let Some(room) = dir.rooms.get(&id) {
                self.sessions()
                    .route_many(room.members.iter().map(String::as_str), &update)
                    .await;
            }
        }
        self.refresh_room_list(&dir, &me).await;
        Ok(())
    }
}
