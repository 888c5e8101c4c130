//! Friend graph transitions.
//!
//! ```text
//!   none --request--> pending --accept--> friends
//!                        |                   |
//!                     decline              remove
//!                        v                   v
//!                       none                none
//! ```
//!
//! A request towards someone who already asked us skips `pending` and goes
//! straight to `friends`, so a pair is never pending in both directions.
//!
//! Each transition is persisted as one [`EdgeChange`] batch before both
//! users' cached sets are updated, so the symmetry of `friends` and the
//! pairing of `incoming`/`outgoing` hold even if the gateway fails.

use parley_shared::protocol::Push;
use parley_store::EdgeChange;
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::hub::{Directory, Hub};
use crate::sessions::ConnectionHandle;

impl Hub {
    pub async fn send_friend_request(&self, conn: &ConnectionHandle, to: &str) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let to = to.trim();

        if to == me {
            return Err(ChatError::InvalidRequest(
                "cannot send a friend request to yourself".into(),
            ));
        }
        let peer = dir.user(to)?;
        if peer.friends.contains(&me) {
            return Err(ChatError::AlreadyFriends(to.to_string()));
        }
        if peer.incoming.contains(&me) {
            debug!(from = %me, to, "Duplicate friend request");
            return Ok(());
        }
        if peer.outgoing.contains(&me) {
            // They already asked us; a crossing request completes the pair.
            info!(from = %me, to, "Crossing friend requests, accepting");
            return self.complete_friendship(&mut dir, to, &me).await;
        }

        dir.gateway().update_friend_edges(&[EdgeChange::Request {
            requester: me.clone(),
            target: to.to_string(),
        }])?;
        if let Some(user) = dir.users.get_mut(&me) {
            user.outgoing.insert(to.to_string());
        }
        if let Some(user) = dir.users.get_mut(to) {
            user.incoming.insert(me.clone());
        }
        info!(from = %me, to, "Friend request sent");

        self.sessions()
            .route(to, &Push::FriendRequest { from: me.clone() })
            .await;
        self.refresh_friend_list(&dir, &me).await;
        self.refresh_friend_list(&dir, to).await;
        Ok(())
    }

    pub async fn accept_friend_request(
        &self,
        conn: &ConnectionHandle,
        from: &str,
    ) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let from = from.trim();
        if !dir.user(&me)?.incoming.contains(from) {
            return Err(ChatError::NoSuchRequest(from.to_string()));
        }
        self.complete_friendship(&mut dir, from, &me).await
    }

    pub async fn decline_friend_request(
        &self,
        conn: &ConnectionHandle,
        from: &str,
    ) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let from = from.trim();
        if !dir.user(&me)?.incoming.contains(from) {
            return Err(ChatError::NoSuchRequest(from.to_string()));
        }

        dir.gateway().update_friend_edges(&[EdgeChange::Decline {
            requester: from.to_string(),
            target: me.clone(),
        }])?;
        if let Some(user) = dir.users.get_mut(&me) {
            user.incoming.remove(from);
        }
        if let Some(user) = dir.users.get_mut(from) {
            user.outgoing.remove(&me);
        }
        info!(requester = from, target = %me, "Friend request declined");

        self.sessions()
            .route(from, &Push::FriendDecline { from: me.clone() })
            .await;
        self.refresh_friend_list(&dir, &me).await;
        self.refresh_friend_list(&dir, from).await;
        Ok(())
    }

    /// Break a friendship. Neither side is left with a pending request.
    pub async fn remove_friend(&self, conn: &ConnectionHandle, username: &str) -> ChatResult<()> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;
        let username = username.trim();
        if !dir.user(&me)?.friends.contains(username) {
            return Err(ChatError::NotFriends(username.to_string()));
        }

        dir.gateway().update_friend_edges(&[EdgeChange::Remove {
            a: me.clone(),
            b: username.to_string(),
        }])?;
        if let Some(user) = dir.users.get_mut(&me) {
            user.friends.remove(username);
        }
        if let Some(user) = dir.users.get_mut(username) {
            user.friends.remove(&me);
        }
        info!(a = %me, b = username, "Friendship removed");

        self.sessions()
            .route(username, &Push::FriendRemove { from: me.clone() })
            .await;
        self.refresh_friend_list(&dir, &me).await;
        self.refresh_friend_list(&dir, username).await;
        Ok(())
    }

    /// pending -> friends for `requester` asking `target`, then let each
    /// side know whether the other is online right now.
    async fn complete_friendship(
        &self,
        dir: &mut Directory,
        requester: &str,
        target: &str,
    ) -> ChatResult<()> {
        dir.gateway().update_friend_edges(&[EdgeChange::Accept {
            requester: requester.to_string(),
            target: target.to_string(),
        }])?;
        for (me, peer) in [(requester, target), (target, requester)] {
            if let Some(user) = dir.users.get_mut(me) {
                user.incoming.remove(peer);
                user.outgoing.remove(peer);
                user.friends.insert(peer.to_string());
            }
        }
        info!(requester, target, "Friend request accepted");

        self.sessions()
            .route(
                requester,
                &Push::FriendAccept {
                    from: target.to_string(),
                },
            )
            .await;
        self.refresh_friend_list(dir, requester).await;
        self.refresh_friend_list(dir, target).await;

        for (me, peer) in [(requester, target), (target, requester)] {
            let online = self.sessions().is_online(peer).await;
            self.sessions()
                .route(
                    me,
                    &Push::Presence {
                        user: peer.to_string(),
                        online,
                    },
                )
                .await;
        }
        Ok(())
    }
}
