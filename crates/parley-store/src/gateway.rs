//! The persistence contract the chat core depends on.
//!
//! Each method is atomic: it either commits fully or leaves prior state
//! unchanged. [`Database`] is the SQLite-backed implementation.

use parley_shared::types::{ChatMessage, MessageTarget};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{EdgeChange, FriendEdge, MembershipChange, RoomRecord, UserRecord};

pub trait Gateway: Send {
    fn create_user(&mut self, user: &UserRecord) -> Result<()>;

    /// `Ok(None)` when no such account exists.
    fn get_user(&self, username: &str) -> Result<Option<UserRecord>>;

    fn load_users(&self) -> Result<Vec<UserRecord>>;

    fn load_friend_edges(&self) -> Result<Vec<FriendEdge>>;

    /// Apply all changes in one transaction.
    fn update_friend_edges(&mut self, changes: &[EdgeChange]) -> Result<()>;

    fn create_room(&mut self, room: &RoomRecord) -> Result<()>;

    fn update_room_membership(&mut self, change: &MembershipChange) -> Result<()>;

    fn load_rooms(&self) -> Result<Vec<RoomRecord>>;

    fn append_message(&mut self, message: &ChatMessage) -> Result<()>;

    /// Chronological tail of a log, at most `limit` entries.
    fn query_messages(&self, target: &MessageTarget, limit: usize) -> Result<Vec<ChatMessage>>;

    fn enqueue_offline(&mut self, username: &str, message: &ChatMessage) -> Result<()>;

    /// Append a direct message to its log and, if `queue_for` is set, to
    /// that user's offline queue, in one transaction.
    fn append_direct(&mut self, message: &ChatMessage, queue_for: Option<&str>) -> Result<()>;

    /// Return and clear the user's queued messages, oldest first.
    fn drain_offline(&mut self, username: &str) -> Result<Vec<ChatMessage>>;
}

impl Gateway for Database {
    fn create_user(&mut self, user: &UserRecord) -> Result<()> {
        self.insert_user(user)
    }

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        match self.find_user(username) {
            Ok(user) => Ok(Some(user)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn load_users(&self) -> Result<Vec<UserRecord>> {
        self.list_users()
    }

    fn load_friend_edges(&self) -> Result<Vec<FriendEdge>> {
        self.list_friend_edges()
    }

    fn update_friend_edges(&mut self, changes: &[EdgeChange]) -> Result<()> {
        self.apply_edge_changes(changes)
    }

    fn create_room(&mut self, room: &RoomRecord) -> Result<()> {
        self.insert_room(room)
    }

    fn update_room_membership(&mut self, change: &MembershipChange) -> Result<()> {
        self.apply_membership_change(change)
    }

    fn load_rooms(&self) -> Result<Vec<RoomRecord>> {
        self.list_rooms()
    }

    fn append_message(&mut self, message: &ChatMessage) -> Result<()> {
        self.insert_message(message)
    }

    fn query_messages(&self, target: &MessageTarget, limit: usize) -> Result<Vec<ChatMessage>> {
        self.recent_messages(target, limit)
    }

    fn enqueue_offline(&mut self, username: &str, message: &ChatMessage) -> Result<()> {
        Database::enqueue_offline(self, username, message)
    }

    fn append_direct(&mut self, message: &ChatMessage, queue_for: Option<&str>) -> Result<()> {
        Database::append_direct(self, message, queue_for)
    }

    fn drain_offline(&mut self, username: &str) -> Result<Vec<ChatMessage>> {
        Database::drain_offline(self, username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::user;

    #[test]
    fn get_user_maps_missing_to_none() {
        let mut db: Box<dyn Gateway> = Box::new(Database::open_in_memory().unwrap());
        db.create_user(&user("alice")).unwrap();

        assert!(db.get_user("alice").unwrap().is_some());
        assert!(db.get_user("nobody").unwrap().is_none());
    }
}
