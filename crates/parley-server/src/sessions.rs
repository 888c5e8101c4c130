//! Session registry: which connection each online username is bound to.
//!
//! Every connection owns an unbounded outbound queue drained by a single
//! writer task, so frames produced by different workers never interleave on
//! the socket. Other components reach a connection only by enqueueing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parley_shared::protocol::{encode_frame, Push};
use serde::Serialize;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info, warn};

/// Notice sent to a connection displaced by a newer login.
pub const SUPERSEDED_NOTICE: &str =
    "Account signed in from another location; this connection will be closed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One encoded frame, already `\n`-terminated.
    Line(String),
    /// Flush what was queued before, then shut the socket down.
    Close,
}

/// Cheap, cloneable handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    peer: Arc<str>,
    tx: mpsc::UnboundedSender<Outbound>,
    shutdown: Arc<Notify>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(peer: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer: String = peer.into();
        let handle = Self {
            id: ConnId::next(),
            peer: Arc::from(peer),
            tx,
            shutdown: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Encode and enqueue a frame. Returns `false` if the connection is gone.
    pub fn send<T: Serialize>(&self, frame: &T) -> bool {
        match encode_frame(frame) {
            Ok(line) => self.send_line(line),
            Err(e) => {
                warn!(conn = %self.id, error = %e, "Failed to encode frame");
                false
            }
        }
    }

    pub fn send_line(&self, line: String) -> bool {
        self.tx.send(Outbound::Line(line)).is_ok()
    }

    /// Ask the writer to flush and shut down, and the reader to stop.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
        self.shutdown.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

/// Outcome of binding a connection to a username.
#[derive(Debug, Default)]
pub struct Installed {
    /// The username already had a live session (possibly this connection).
    pub was_online: bool,
    /// A different connection that was displaced and closed.
    pub superseded: Option<ConnectionHandle>,
    /// The connection was previously logged in as another user.
    pub replaced_user: Option<String>,
}

#[derive(Default)]
struct Sessions {
    by_user: HashMap<String, ConnectionHandle>,
    by_conn: HashMap<ConnId, String>,
}

/// Maps online usernames to their single live connection.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `username` to `conn`.
    ///
    /// A different connection already bound to `username` is sent
    /// [`SUPERSEDED_NOTICE`] and closed before the new binding is stored, all
    /// under one write lock, so two connections are never registered for the
    /// same user at once.
    pub async fn install(&self, username: &str, conn: ConnectionHandle) -> Installed {
        let mut sessions = self.inner.write().await;
        let mut outcome = Installed::default();

        if let Some(previous) = sessions.by_conn.remove(&conn.id()) {
            if previous != username {
                sessions.by_user.remove(&previous);
                outcome.replaced_user = Some(previous);
            }
        }

        if let Some(prior) = sessions.by_user.remove(username) {
            outcome.was_online = true;
            if prior.id() != conn.id() {
                sessions.by_conn.remove(&prior.id());
                prior.send(&Push::System {
                    message: SUPERSEDED_NOTICE.to_string(),
                });
                prior.close();
                info!(
                    username,
                    old = %prior.id(),
                    new = %conn.id(),
                    "Superseded previous session"
                );
                outcome.superseded = Some(prior);
            }
        }

        sessions.by_conn.insert(conn.id(), username.to_string());
        sessions.by_user.insert(username.to_string(), conn);
        outcome
    }

    /// Drop the session owned by `conn`, if any. Idempotent: only the first
    /// call for a given binding returns the username.
    pub async fn remove(&self, conn: ConnId) -> Option<String> {
        let mut sessions = self.inner.write().await;
        let username = sessions.by_conn.remove(&conn)?;
        let owns_binding = sessions
            .by_user
            .get(&username)
            .is_some_and(|handle| handle.id() == conn);
        if owns_binding {
            sessions.by_user.remove(&username);
        }
        Some(username)
    }

    pub async fn user_of(&self, conn: ConnId) -> Option<String> {
        self.inner.read().await.by_conn.get(&conn).cloned()
    }

    pub async fn is_online(&self, username: &str) -> bool {
        self.inner.read().await.by_user.contains_key(username)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    /// Best-effort delivery to `username`'s connection. `false` means the
    /// user is offline; callers decide whether that warrants queueing.
    pub async fn route<T: Serialize>(&self, username: &str, frame: &T) -> bool {
        let sessions = self.inner.read().await;
        match sessions.by_user.get(username) {
            Some(handle) => handle.send(frame),
            None => false,
        }
    }

    /// Deliver one frame to every online user in `usernames`. Returns how
    /// many connections it was enqueued on.
    pub async fn route_many<'a, T, I>(&self, usernames: I, frame: &T) -> usize
    where
        T: Serialize,
        I: IntoIterator<Item = &'a str>,
    {
        let line = match encode_frame(frame) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode broadcast frame");
                return 0;
            }
        };

        let sessions = self.inner.read().await;
        let mut delivered = 0;
        for username in usernames {
            if let Some(handle) = sessions.by_user.get(username) {
                if handle.send_line(line.clone()) {
                    delivered += 1;
                }
            }
        }
        debug!(delivered, "Broadcast frame");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_install_and_remove() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = ConnectionHandle::new("test");

        let outcome = registry.install("alice", conn.clone()).await;
        assert!(!outcome.was_online);
        assert!(registry.is_online("alice").await);
        assert_eq!(registry.user_of(conn.id()).await.as_deref(), Some("alice"));

        assert_eq!(registry.remove(conn.id()).await.as_deref(), Some("alice"));
        assert!(!registry.is_online("alice").await);
        assert_eq!(registry.remove(conn.id()).await, None);
    }

    #[tokio::test]
    async fn test_second_login_supersedes_first() {
        let registry = SessionRegistry::new();
        let (first, mut first_rx) = ConnectionHandle::new("first");
        let (second, _second_rx) = ConnectionHandle::new("second");

        registry.install("alice", first.clone()).await;
        let outcome = registry.install("alice", second.clone()).await;

        assert!(outcome.was_online);
        assert_eq!(outcome.superseded.map(|c| c.id()), Some(first.id()));
        assert_eq!(registry.online_count().await, 1);

        let items = drain(&mut first_rx);
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Outbound::Line(l) if l.contains("\"system\"")));
        assert_eq!(items[1], Outbound::Close);

        // The displaced connection's teardown must not unbind the new one.
        assert_eq!(registry.remove(first.id()).await, None);
        assert!(registry.is_online("alice").await);
        assert_eq!(registry.user_of(second.id()).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_relogin_as_other_user_reports_replacement() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = ConnectionHandle::new("test");

        registry.install("alice", conn.clone()).await;
        let outcome = registry.install("bob", conn.clone()).await;

        assert_eq!(outcome.replaced_user.as_deref(), Some("alice"));
        assert!(!registry.is_online("alice").await);
        assert!(registry.is_online("bob").await);
    }

    #[tokio::test]
    async fn test_route_to_offline_user_reports_false() {
        let registry = SessionRegistry::new();
        let (conn, mut rx) = ConnectionHandle::new("test");
        registry.install("alice", conn).await;

        let frame = Push::System {
            message: "hi".into(),
        };
        assert!(registry.route("alice", &frame).await);
        assert!(!registry.route("bob", &frame).await);
        assert_eq!(registry.route_many(["alice", "bob"], &frame).await, 1);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_close_wakes_reader() {
        let (conn, _rx) = ConnectionHandle::new("test");
        conn.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), conn.closed())
            .await
            .expect("close should notify");
    }
}
