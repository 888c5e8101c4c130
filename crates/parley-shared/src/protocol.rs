//! Line-delimited JSON wire protocol.
//!
//! Every frame is one UTF-8 JSON object terminated by `\n`.
//!
//! Client requests come in two shapes, both normalised by [`decode_request`]:
//!
//! ```text
//! {"type": "login", "payload": {"username": "alice", "password": "pw1"}}
//! {"action": "login", "username": "alice", "password": "pw1"}
//! ```
//!
//! Older clients wrap the legacy shape in a generic envelope,
//! `{"type": "request", "req_id": 7, "action": "login", ...}`; the `action`
//! field wins whenever `type` does not itself name an action.
//!
//! Server frames (request replies and unsolicited pushes) always carry a
//! `type` and a `ts` stamp, see [`encode_frame`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::FrameError;
use crate::types::{
    ChatMessage, FriendEntry, MessageKind, RoomAction, RoomId, RoomSummary, TargetType,
    UserSummary,
};

// ---------------------------------------------------------------------------
// Requests (client -> server)
// ---------------------------------------------------------------------------

/// Action names accepted on the wire, including legacy spellings.
const KNOWN_ACTIONS: &[&str] = &[
    "register",
    "login",
    "logout",
    "search_users",
    "friend_request",
    "send_friend_request",
    "friend_accept",
    "accept_friend_request",
    "friend_decline",
    "friend_remove",
    "remove_friend",
    "create_room",
    "create_chat_room",
    "join_room",
    "join_chat_room",
    "leave_room",
    "send_message",
    "send_private_message",
    "respond_friend_request",
    "fetch_history",
    "typing",
    "list_friends",
    "show_friends",
    "get_friend_list",
    "list_rooms",
    "show_chat_rooms",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Register {
        username: String,
        password: String,
        #[serde(alias = "full_name")]
        display_name: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout {},
    SearchUsers {
        #[serde(default)]
        query: String,
    },
    #[serde(alias = "send_friend_request")]
    FriendRequest {
        #[serde(alias = "to_user")]
        to: String,
    },
    #[serde(alias = "accept_friend_request")]
    FriendAccept {
        #[serde(alias = "from_user")]
        from: String,
    },
    FriendDecline {
        #[serde(alias = "from_user")]
        from: String,
    },
    #[serde(alias = "remove_friend")]
    FriendRemove {
        #[serde(alias = "to_user", alias = "to")]
        username: String,
    },
    #[serde(alias = "create_chat_room")]
    CreateRoom {
        #[serde(alias = "name")]
        room_name: String,
    },
    #[serde(alias = "join_chat_room")]
    JoinRoom {
        #[serde(deserialize_with = "string_or_number")]
        room_id: String,
    },
    LeaveRoom {
        #[serde(deserialize_with = "string_or_number")]
        room_id: String,
    },
    SendMessage(SendMessage),
    FetchHistory {
        target_type: TargetType,
        #[serde(deserialize_with = "string_or_number")]
        to: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    Typing {
        target_type: TargetType,
        #[serde(deserialize_with = "string_or_number")]
        to: String,
        #[serde(default)]
        is_typing: bool,
    },
    #[serde(alias = "show_friends", alias = "get_friend_list")]
    ListFriends {},
    #[serde(alias = "show_chat_rooms")]
    ListRooms {},
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendMessage {
    pub target_type: TargetType,
    #[serde(deserialize_with = "string_or_number")]
    pub to: String,
    #[serde(default)]
    pub msgtype: MessageKind,
    #[serde(default, alias = "message")]
    pub content: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub data_base64: Option<String>,
}

impl Request {
    /// Canonical action name, used as the `type` of the reply.
    pub fn action(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Login { .. } => "login",
            Request::Logout {} => "logout",
            Request::SearchUsers { .. } => "search_users",
            Request::FriendRequest { .. } => "friend_request",
            Request::FriendAccept { .. } => "friend_accept",
            Request::FriendDecline { .. } => "friend_decline",
            Request::FriendRemove { .. } => "friend_remove",
            Request::CreateRoom { .. } => "create_room",
            Request::JoinRoom { .. } => "join_room",
            Request::LeaveRoom { .. } => "leave_room",
            Request::SendMessage(_) => "send_message",
            Request::FetchHistory { .. } => "fetch_history",
            Request::Typing { .. } => "typing",
            Request::ListFriends {} => "list_friends",
            Request::ListRooms {} => "list_rooms",
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Parse one inbound line into a [`Request`].
pub fn decode_request(line: &str) -> Result<Request, FrameError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let Value::Object(mut frame) = value else {
        return Err(FrameError::Malformed("frame is not a JSON object".into()));
    };

    let legacy_action = match frame.get("action") {
        Some(Value::String(action)) => Some(action.clone()),
        _ => None,
    };
    let typed_action = match frame.get("type") {
        Some(Value::String(kind)) if legacy_action.is_none() || is_action(kind) => {
            Some(kind.clone())
        }
        _ => None,
    };

    let (action, mut fields) = match (typed_action, legacy_action) {
        (Some(action), _) => {
            let payload = match frame.remove("payload") {
                Some(Value::Object(payload)) => payload,
                None | Some(Value::Null) => Map::new(),
                Some(_) => {
                    return Err(FrameError::InvalidPayload {
                        action,
                        reason: "payload must be an object".into(),
                    })
                }
            };
            (action, payload)
        }
        (None, Some(action)) => {
            frame.remove("type");
            frame.remove("action");
            (action, frame)
        }
        (None, None) => return Err(FrameError::Malformed("missing action name".into())),
    };

    if !KNOWN_ACTIONS.contains(&action.as_str()) {
        return Err(FrameError::UnsupportedAction(action));
    }
    let action = resolve_legacy_action(action, &mut fields)?;

    fields.insert("type".into(), Value::String(action.clone()));
    serde_json::from_value(Value::Object(fields)).map_err(|e| FrameError::InvalidPayload {
        action,
        reason: e.to_string(),
    })
}

fn is_action(kind: &str) -> bool {
    kind != "request" && KNOWN_ACTIONS.contains(&kind)
}

/// Rewrite legacy actions whose meaning depends on their fields into the
/// canonical action.
fn resolve_legacy_action(
    action: String,
    fields: &mut Map<String, Value>,
) -> Result<String, FrameError> {
    match action.as_str() {
        "send_private_message" => {
            fields
                .entry("target_type")
                .or_insert_with(|| Value::String(TargetType::Direct.as_str().into()));
            Ok("send_message".into())
        }
        "respond_friend_request" => {
            let accept = match (fields.get("accept"), fields.get("response")) {
                (Some(Value::Bool(accept)), _) => *accept,
                (_, Some(Value::String(response))) if response == "accept" => true,
                (_, Some(Value::String(response))) if response == "reject" => false,
                _ => {
                    return Err(FrameError::InvalidPayload {
                        action,
                        reason: "expected `accept` or `response`".into(),
                    })
                }
            };
            Ok(if accept { "friend_accept" } else { "friend_decline" }.into())
        }
        _ => Ok(action),
    }
}

// ---------------------------------------------------------------------------
// Server frames (server -> client)
// ---------------------------------------------------------------------------

/// Unsolicited server-initiated events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Push {
    Presence {
        user: String,
        online: bool,
    },
    FriendList(FriendListSnapshot),
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    NewMessage {
        message: ChatMessage,
    },
    RoomUpdate {
        room_id: RoomId,
        name: String,
        action: RoomAction,
        user: String,
    },
    FriendRequest {
        from: String,
    },
    FriendAccept {
        from: String,
    },
    FriendDecline {
        from: String,
    },
    FriendRemove {
        from: String,
    },
    Typing {
        from: String,
        target_type: TargetType,
        to: String,
        is_typing: bool,
    },
    System {
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FriendListSnapshot {
    pub friends: Vec<FriendEntry>,
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
}

/// Definite answer to one request: `ok: true` plus a body, or `ok: false`
/// plus an error code.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    #[serde(rename = "type")]
    pub action: String,
    pub ok: bool,
    #[serde(flatten)]
    pub body: ReplyBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Empty {},
    Message {
        message: String,
    },
    Login {
        username: String,
        display_name: String,
    },
    SearchResults {
        results: Vec<UserSummary>,
    },
    Room {
        room: RoomSummary,
    },
    Sent {
        sent_at: DateTime<Utc>,
        message: ChatMessage,
    },
    History {
        messages: Vec<ChatMessage>,
    },
    Failure {
        error: String,
        code: &'static str,
        retryable: bool,
    },
}

impl Reply {
    pub fn ok(action: impl Into<String>, body: ReplyBody) -> Self {
        Self {
            action: action.into(),
            ok: true,
            body,
        }
    }

    pub fn failure(
        action: impl Into<String>,
        error: impl Into<String>,
        code: &'static str,
        retryable: bool,
    ) -> Self {
        Self {
            action: action.into(),
            ok: false,
            body: ReplyBody::Failure {
                error: error.into(),
                code,
                retryable,
            },
        }
    }
}

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    #[serde(flatten)]
    frame: &'a T,
    ts: String,
}

/// ISO-8601 UTC timestamp with second precision, e.g. `2024-05-01T12:00:00Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serialize a server frame, stamp it with `ts`, and terminate it with `\n`.
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&Stamped {
        frame,
        ts: now_iso(),
    })?;
    line.push('\n');
    Ok(line)
}
