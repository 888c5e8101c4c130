use parley_shared::protocol::Push;
use tracing::debug;

use crate::hub::{Directory, Hub};

impl Hub {
    /// Tell every online friend of `username` about an online/offline
    /// transition. Only the friends set receives presence; pending
    /// requesters do not.
    pub(crate) async fn broadcast_presence(&self, dir: &Directory, username: &str, online: bool) {
        let Some(user) = dir.users.get(username) else {
            return;
        };
        let frame = Push::Presence {
            user: username.to_string(),
            online,
        };
        let delivered = self
            .sessions()
            .route_many(user.friends.iter().map(String::as_str), &frame)
            .await;
        debug!(username, online, delivered, "Presence broadcast");
    }
}
