//! Shared chat state.
//!
//! [`Hub`] owns the session registry and the [`Directory`]: the user and room
//! records cached in memory in front of the persistence gateway. All
//! mutations of users and rooms happen under the single directory lock.
//! Lock order is always directory first, then sessions; the session lock is
//! never held while waiting for the directory.
//!
//! Mutating operations write through the gateway first and only touch the
//! cache once the write committed, so a storage failure leaves both
//! unchanged.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};

use parley_shared::crypto::PasswordHash;
use parley_shared::protocol::{FriendListSnapshot, Push};
use parley_shared::types::{FriendEntry, RoomId, RoomSummary, UserSummary};
use parley_store::{EdgeStatus, Gateway, StoreError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ChatError, ChatResult};
use crate::sessions::{ConnectionHandle, SessionRegistry};

#[derive(Debug, Clone)]
pub(crate) struct UserEntry {
    pub username: String,
    pub display_name: String,
    pub credential: PasswordHash,
    pub friends: BTreeSet<String>,
    pub incoming: BTreeSet<String>,
    pub outgoing: BTreeSet<String>,
    pub rooms: BTreeSet<RoomId>,
}

impl UserEntry {
    pub fn new(username: String, display_name: String, credential: PasswordHash) -> Self {
        Self {
            username,
            display_name,
            credential,
            friends: BTreeSet::new(),
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            rooms: BTreeSet::new(),
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RoomEntry {
    pub id: RoomId,
    pub name: String,
    pub owner: String,
    pub members: BTreeSet<String>,
}

impl RoomEntry {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
        }
    }
}

/// In-memory cache of users and rooms plus the gateway behind it.
pub(crate) struct Directory {
    /// Only reached through `&mut self`, so the lock never contends; it
    /// lets the directory be shared across tasks.
    gateway: std::sync::Mutex<Box<dyn Gateway>>,
    pub users: HashMap<String, UserEntry>,
    pub rooms: HashMap<RoomId, RoomEntry>,
}

impl Directory {
    /// Warm the cache from durable storage.
    pub fn load(gateway: Box<dyn Gateway>) -> Result<Self, StoreError> {
        let mut users = HashMap::new();
        for record in gateway.load_users()? {
            let credential =
                PasswordHash::from_hex(&record.password_salt, &record.password_hash).map_err(
                    |e| StoreError::Corrupt(format!("credential of {}: {e}", record.username)),
                )?;
            users.insert(
                record.username.clone(),
                UserEntry::new(record.username, record.display_name, credential),
            );
        }

        for edge in gateway.load_friend_edges()? {
            if !users.contains_key(&edge.requester) || !users.contains_key(&edge.target) {
                warn!(
                    requester = %edge.requester,
                    target = %edge.target,
                    "Skipping friend edge to unknown user"
                );
                continue;
            }
            match edge.status {
                EdgeStatus::Pending => {
                    if let Some(u) = users.get_mut(&edge.requester) {
                        u.outgoing.insert(edge.target.clone());
                    }
                    if let Some(u) = users.get_mut(&edge.target) {
                        u.incoming.insert(edge.requester.clone());
                    }
                }
                EdgeStatus::Accepted => {
                    if let Some(u) = users.get_mut(&edge.requester) {
                        u.friends.insert(edge.target.clone());
                    }
                    if let Some(u) = users.get_mut(&edge.target) {
                        u.friends.insert(edge.requester.clone());
                    }
                }
            }
        }

        let mut rooms = HashMap::new();
        for record in gateway.load_rooms()? {
            if record.members.is_empty() {
                warn!(room = %record.id, "Skipping room without members");
                continue;
            }
            for member in &record.members {
                if let Some(u) = users.get_mut(member) {
                    u.rooms.insert(record.id);
                }
            }
            rooms.insert(
                record.id,
                RoomEntry {
                    id: record.id,
                    name: record.name,
                    owner: record.owner,
                    members: record.members.into_iter().collect(),
                },
            );
        }

        info!(users = users.len(), rooms = rooms.len(), "Loaded directory");
        Ok(Self {
            gateway: std::sync::Mutex::new(gateway),
            users,
            rooms,
        })
    }

    pub fn gateway(&mut self) -> &mut Box<dyn Gateway> {
        self.gateway.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user(&self, username: &str) -> ChatResult<&UserEntry> {
        self.users
            .get(username)
            .ok_or_else(|| ChatError::UserNotFound(username.to_string()))
    }

    /// Look up a room by its wire id. Unparsable ids are simply not found.
    pub fn room(&self, room_id: &str) -> ChatResult<&RoomEntry> {
        room_id
            .parse::<RoomId>()
            .ok()
            .and_then(|id| self.rooms.get(&id))
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))
    }

    pub fn room_list(&self, username: &str) -> Push {
        let mut rooms: Vec<RoomSummary> = self
            .users
            .get(username)
            .map(|u| {
                u.rooms
                    .iter()
                    .filter_map(|id| self.rooms.get(id))
                    .map(RoomEntry::summary)
                    .collect()
            })
            .unwrap_or_default();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Push::RoomList { rooms }
    }
}

/// Process-wide chat state shared by every connection worker.
pub struct Hub {
    config: Arc<ServerConfig>,
    sessions: SessionRegistry,
    directory: Mutex<Directory>,
}

impl Hub {
    pub fn open(gateway: Box<dyn Gateway>, config: Arc<ServerConfig>) -> Result<Self, StoreError> {
        Ok(Self {
            config,
            sessions: SessionRegistry::new(),
            directory: Mutex::new(Directory::load(gateway)?),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().await
    }

    /// The user `conn` is logged in as.
    ///
    /// A session whose user is missing from the directory means the
    /// in-memory state is corrupt; that is fatal for this connection only.
    pub(crate) async fn current_user(
        &self,
        dir: &Directory,
        conn: &ConnectionHandle,
    ) -> ChatResult<String> {
        let username = self
            .sessions
            .user_of(conn.id())
            .await
            .ok_or(ChatError::NotAuthenticated)?;
        if !dir.users.contains_key(&username) {
            error!(conn = %conn.id(), username = %username, "Session bound to unknown user");
            return Err(ChatError::Inconsistent(format!(
                "session for unknown user {username}"
            )));
        }
        Ok(username)
    }

    pub(crate) async fn friend_list(&self, dir: &Directory, username: &str) -> Push {
        let Some(user) = dir.users.get(username) else {
            return Push::FriendList(FriendListSnapshot::default());
        };

        let mut friends = Vec::with_capacity(user.friends.len());
        for friend in &user.friends {
            let display_name = dir
                .users
                .get(friend)
                .map(|f| f.display_name.clone())
                .unwrap_or_else(|| friend.clone());
            friends.push(FriendEntry {
                username: friend.clone(),
                display_name,
                online: self.sessions.is_online(friend).await,
            });
        }

        Push::FriendList(FriendListSnapshot {
            friends,
            incoming: user.incoming.iter().cloned().collect(),
            outgoing: user.outgoing.iter().cloned().collect(),
        })
    }

    /// Send a fresh friend list to `username` if they are online.
    pub(crate) async fn refresh_friend_list(&self, dir: &Directory, username: &str) {
        if self.sessions.is_online(username).await {
            let snapshot = self.friend_list(dir, username).await;
            self.sessions.route(username, &snapshot).await;
        }
    }

    pub(crate) async fn refresh_room_list(&self, dir: &Directory, username: &str) {
        self.sessions.route(username, &dir.room_list(username)).await;
    }

    pub async fn list_friends(&self, conn: &ConnectionHandle) -> ChatResult<Push> {
        let dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        Ok(self.friend_list(&dir, &me).await)
    }

    pub async fn list_rooms(&self, conn: &ConnectionHandle) -> ChatResult<Push> {
        let dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        Ok(dir.room_list(&me))
    }

    /// Case-insensitive user search: exact match, then prefix matches, then
    /// substring matches. An empty query lists the first accounts by name.
    pub async fn search_users(&self, query: &str) -> Vec<UserSummary> {
        let limit = self.config.search_limit;
        let dir = self.lock().await;

        let mut names: Vec<&String> = dir.users.keys().collect();
        names.sort();

        let query = query.trim().to_lowercase();
        let ordered: Vec<&String> = if query.is_empty() {
            names
        } else {
            let rank = |name: &str| {
                let lower = name.to_lowercase();
                if lower == query {
                    Some(0)
                } else if lower.starts_with(&query) {
                    Some(1)
                } else if lower.contains(&query) {
                    Some(2)
                } else {
                    None
                }
            };
            let mut ranked: Vec<(u8, &String)> = names
                .into_iter()
                .filter_map(|name| rank(name).map(|r| (r, name)))
                .collect();
            ranked.sort();
            ranked.into_iter().map(|(_, name)| name).collect()
        };

        ordered
            .into_iter()
            .take(limit)
            .filter_map(|name| dir.users.get(name))
            .map(UserEntry::summary)
            .collect()
    }
}
