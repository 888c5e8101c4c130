use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Key of the implicit message log shared by two users.
///
/// The pair is stored sorted, so `DirectKey::new(a, b) == DirectKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectKey {
    low: String,
    high: String,
}

impl DirectKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn parties(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

/// Where a message is logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    Direct(DirectKey),
    Room(RoomId),
}

impl MessageTarget {
    /// Stable storage key for the target's message log.
    ///
    /// Usernames are length-prefixed so no pair of names can collide.
    pub fn channel_key(&self) -> String {
        match self {
            MessageTarget::Direct(key) => {
                let (low, high) = key.parties();
                format!("dm:{}:{}:{}", low.len(), low, high)
            }
            MessageTarget::Room(id) => format!("room:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "dm", alias = "direct")]
    Direct,
    #[serde(rename = "room")]
    Room,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Direct => "dm",
            TargetType::Room => "room",
        }
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" | "direct" => Ok(TargetType::Direct),
            "room" => Ok(TargetType::Room),
            other => Err(format!("unknown target type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Typing,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::Typing => "typing",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            "typing" => Ok(MessageKind::Typing),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A persisted chat message (direct or room). Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub from: String,
    pub target_type: TargetType,
    /// Recipient username for direct messages, room id for room messages.
    pub to: String,
    #[serde(rename = "msgtype")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Attachment bytes, base64 text passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    pub ts: DateTime<Utc>,
}

impl ChatMessage {
    /// The log this message belongs to, or `None` if a room message carries
    /// an unparsable room id.
    pub fn target(&self) -> Option<MessageTarget> {
        match self.target_type {
            TargetType::Direct => Some(MessageTarget::Direct(DirectKey::new(&self.from, &self.to))),
            TargetType::Room => self.to.parse().ok().map(MessageTarget::Room),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub username: String,
    pub display_name: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomAction {
    Join,
    Leave,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_key_is_unordered() {
        assert_eq!(DirectKey::new("alice", "bob"), DirectKey::new("bob", "alice"));
        assert_eq!(DirectKey::new("bob", "alice").parties(), ("alice", "bob"));
    }

    #[test]
    fn test_channel_keys_do_not_collide() {
        let a = MessageTarget::Direct(DirectKey::new("a:1", "b"));
        let b = MessageTarget::Direct(DirectKey::new("a", "1:b"));
        assert_ne!(a.channel_key(), b.channel_key());
    }

    #[test]
    fn test_target_type_wire_names() {
        assert_eq!(serde_json::to_string(&TargetType::Direct).unwrap(), "\"dm\"");
        let parsed: TargetType = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(parsed, TargetType::Direct);
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            from: "alice".into(),
            target_type: TargetType::Direct,
            to: "bob".into(),
            kind: MessageKind::Text,
            content: "hi".into(),
            filename: None,
            data_base64: None,
            ts: Utc::now(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["msgtype"], "text");
        assert_eq!(value["target_type"], "dm");
        assert!(value.get("filename").is_none());
        assert_eq!(
            msg.target(),
            Some(MessageTarget::Direct(DirectKey::new("bob", "alice")))
        );
    }

    #[test]
    fn test_room_id_parse() {
        let id = RoomId::new();
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("1234".parse::<RoomId>().is_err());
    }
}
