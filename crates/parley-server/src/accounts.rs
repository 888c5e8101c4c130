//! Registration, login and session teardown.

use parley_shared::protocol::{Push, Reply, ReplyBody};
use tracing::{debug, info};

use crate::error::ChatResult;
use crate::hub::Hub;
use crate::sessions::ConnectionHandle;

impl Hub {
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> ChatResult<()> {
        let mut dir = self.lock().await;
        dir.register_account(username, password, display_name)
    }

    /// Authenticate `conn` as `username` and bring the client up to date.
    ///
    /// On success the connection receives, in order: the `login` reply, every
    /// queued offline message, a `friend_list` snapshot and a `room_list`
    /// snapshot. Friends are told the user came online unless a session
    /// already existed. Any previous connection of the same user is
    /// superseded. Errors are returned without anything having been sent.
    pub async fn login(
        &self,
        conn: &ConnectionHandle,
        username: &str,
        password: &str,
    ) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let user = dir.verify_credentials(username, password)?;
        let username = user.username.clone();
        let display_name = user.display_name.clone();

        let queued = dir.gateway().drain_offline(&username)?;

        let installed = self.sessions().install(&username, conn.clone()).await;
        if let Some(previous) = installed.replaced_user.as_deref() {
            info!(conn = %conn.id(), previous, "Connection switched user");
            self.broadcast_presence(&dir, previous, false).await;
        }
        info!(
            conn = %conn.id(),
            peer = conn.peer(),
            username = %username,
            queued = queued.len(),
            superseded = installed.superseded.is_some(),
            "Logged in"
        );

        conn.send(&Reply::ok(
            "login",
            ReplyBody::Login {
                username: username.clone(),
                display_name,
            },
        ));
        for message in queued {
            conn.send(&Push::NewMessage { message });
        }
        conn.send(&self.friend_list(&dir, &username).await);
        conn.send(&dir.room_list(&username));

        if !installed.was_online {
            self.broadcast_presence(&dir, &username, true).await;
        }
        Ok(())
    }

    /// End the session bound to `conn`. Safe to call any number of times;
    /// only the call that actually removes a session broadcasts offline.
    pub async fn disconnect(&self, conn: &ConnectionHandle) {
        let dir = self.lock().await;
        match self.sessions().remove(conn.id()).await {
            Some(username) => {
                info!(conn = %conn.id(), username = %username, "Session ended");
                if !self.sessions().is_online(&username).await {
                    self.broadcast_presence(&dir, &username, false).await;
                }
            }
            None => debug!(conn = %conn.id(), "No session to end"),
        }
    }

    /// Explicit logout. The connection stays open and may log in again.
    pub async fn logout(&self, conn: &ConnectionHandle) {
        self.disconnect(conn).await;
    }
}
