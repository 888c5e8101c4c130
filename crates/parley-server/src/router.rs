//! Message routing: direct and room messages, typing signals and history.
//!
//! Direct messages to an offline recipient go to their durable offline
//! queue, committed together with the log entry. Room messages are only
//! delivered to members online at send time; offline members read them from
//! history.

use chrono::Utc;
use parley_shared::protocol::{Push, SendMessage};
use parley_shared::types::{ChatMessage, DirectKey, MessageKind, MessageTarget, TargetType};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::hub::Hub;
use crate::sessions::ConnectionHandle;

impl Hub {
    /// Log and deliver a message. Returns the stored message.
    pub async fn send_message(
        &self,
        conn: &ConnectionHandle,
        request: SendMessage,
    ) -> ChatResult<ChatMessage> {
        if request.msgtype == MessageKind::Typing {
            return Err(ChatError::InvalidRequest(
                "typing signals use the typing action".into(),
            ));
        }

        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;

        let mut message = ChatMessage {
            id: Uuid::new_v4(),
            from: me.clone(),
            target_type: request.target_type,
            to: request.to,
            kind: request.msgtype,
            content: request.content,
            filename: request.filename,
            data_base64: request.data_base64,
            ts: Utc::now(),
        };

        match request.target_type {
            TargetType::Direct => {
                let recipient = dir.user(&message.to)?.username.clone();
                // Sessions only change under the directory lock, so this
                // answer holds until the write below has committed.
                let online = self.sessions().is_online(&recipient).await;
                let queue_for = (!online).then_some(recipient.as_str());
                dir.gateway().append_direct(&message, queue_for)?;

                if online {
                    let frame = Push::NewMessage {
                        message: message.clone(),
                    };
                    if self.sessions().route(&recipient, &frame).await {
                        debug!(from = %me, to = %recipient, "Direct message delivered");
                    } else {
                        // The connection died before its teardown ran.
                        warn!(to = %recipient, "Live delivery failed, queueing");
                        if let Err(e) = dir.gateway().enqueue_offline(&recipient, &message) {
                            warn!(to = %recipient, error = %e, "Could not queue message");
                        }
                    }
                } else {
                    debug!(from = %me, to = %recipient, "Direct message queued");
                }
            }
            TargetType::Room => {
                let room = dir.room(&message.to)?;
                if !room.members.contains(&me) {
                    return Err(ChatError::NotRoomMember(message.to.clone()));
                }
                let recipients: Vec<String> =
                    room.members.iter().filter(|m| **m != me).cloned().collect();
                message.to = room.id.to_string();
                dir.gateway().append_message(&message)?;

                let frame = Push::NewMessage {
                    message: message.clone(),
                };
                let delivered = self
                    .sessions()
                    .route_many(recipients.iter().map(String::as_str), &frame)
                    .await;
                debug!(from = %me, room = %message.to, delivered, "Room message delivered");
            }
        }
        Ok(message)
    }

    /// Relay a typing signal to whoever is online. Never stored.
    pub async fn typing(
        &self,
        conn: &ConnectionHandle,
        target_type: TargetType,
        to: &str,
        is_typing: bool,
    ) -> ChatResult<()> {
        let dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;

        let (to, recipients) = match target_type {
            TargetType::Direct => {
                let peer = dir.user(to)?;
                (peer.username.clone(), vec![peer.username.clone()])
            }
            TargetType::Room => {
                let room = dir.room(to)?;
                if !room.members.contains(&me) {
                    return Err(ChatError::NotRoomMember(to.to_string()));
                }
                let others: Vec<String> =
                    room.members.iter().filter(|m| **m != me).cloned().collect();
                (room.id.to_string(), others)
            }
        };

        let frame = Push::Typing {
            from: me,
            target_type,
            to,
            is_typing,
        };
        self.sessions()
            .route_many(recipients.iter().map(String::as_str), &frame)
            .await;
        Ok(())
    }

    /// Tail of a direct or room log, oldest first. Only the two parties of a
    /// direct channel, or current room members, may read it.
    pub async fn fetch_history(
        &self,
        conn: &ConnectionHandle,
        target_type: TargetType,
        to: &str,
        limit: Option<usize>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let mut dir = self.lock().await;
        let me = self.current_user(&dir, conn).await?;

        let target = match target_type {
            TargetType::Direct => {
                let peer = dir.user(to)?;
                MessageTarget::Direct(DirectKey::new(&me, &peer.username))
            }
            TargetType::Room => {
                let room = dir.room(to)?;
                if !room.members.contains(&me) {
                    return Err(ChatError::NotRoomMember(to.to_string()));
                }
                MessageTarget::Room(room.id)
            }
        };

        let limit = self.config().history_page(limit);
        Ok(dir.gateway().query_messages(&target, limit)?)
    }
}
