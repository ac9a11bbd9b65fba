//! Wire-compatible protocol types for the collaboration server.
//!
//! Every message is a flat JSON object whose `type` field carries a
//! snake_case tag and whose remaining fields are camelCase, e.g.
//! `{"type":"join_room","roomId":"r1"}`.
//!
//! - [`ClientMessage`]: everything the client may send.
//! - [`ServerMessage`]: every server message the client understands.
//! - [`InboundMessage`]: a decoded inbound frame: either a known
//!   [`ServerMessage`] or an unrecognized tag carried verbatim.
//!
//! Server payloads keep keys they do not name in an `extra` map, so a decoded
//! message serializes back to the object it came from.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ── Scalars ─────────────────────────────────────────────────────────

/// Identifier for users, clients and messages.
///
/// The server is free to use numeric or string identifiers; both are
/// accepted and re-serialized in the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A point in time as sent on the wire: Unix milliseconds or an ISO 8601 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Iso(String),
}

impl Timestamp {
    /// The current wall-clock time in Unix milliseconds.
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self::Millis(millis)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// Server-assigned user profile.
///
/// Only `id` and `username` are interpreted; any other keys the server sends
/// are kept in `extra` so the profile re-serializes unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserProfile {
    /// A profile carrying only a username.
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }
}

/// A chat entry: text, image or shared file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Id,
    pub user_id: Id,
    pub username: String,
    pub content: String,
    /// Attachment details (filename, size, path, caption, ...) for image and file entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub timestamp: Timestamp,
    /// Keys not interpreted by this client, kept so the payload re-serializes unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload of `connection_established`: the identity assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablished {
    pub client_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `room_joined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    pub room_id: String,
    #[serde(default)]
    pub current_users: Vec<UserProfile>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `user_joined`, `user_left`, `speaker_joined` and `speaker_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub user_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `message_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHistory {
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `file_list`. File descriptors are server-defined and passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An opaque application state blob relayed to every room member.
///
/// `user_id` is stamped by the server on relay and is absent on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateBroadcast {
    pub app_name: String,
    pub state: Value,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Id>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to join a room; answered by `room_joined`.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    /// Post a text message to the current room.
    TextMessage { content: String },
    /// Post an image. `data` is the encoded image (typically a data URL).
    ImageMessage {
        filename: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Announce a finished file upload.
    FileUploadComplete {
        filename: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Request chat history; answered by `message_history`.
    GetMessages {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<Timestamp>,
    },
    /// Request the room's file listing; answered by `file_list`.
    GetFiles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Relay application state to the room.
    AppStateBroadcast(AppStateBroadcast),
}

impl ClientMessage {
    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::TextMessage { .. } => "text_message",
            Self::ImageMessage { .. } => "image_message",
            Self::FileUploadComplete { .. } => "file_upload_complete",
            Self::GetMessages { .. } => "get_messages",
            Self::GetFiles { .. } => "get_files",
            Self::AppStateBroadcast(_) => "app_state_broadcast",
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake completed; carries the assigned identity.
    ConnectionEstablished(ConnectionEstablished),
    /// Room membership confirmed.
    RoomJoined(RoomJoined),
    TextMessage(ChatMessage),
    ImageMessage(ChatMessage),
    FileShared(ChatMessage),
    UserJoined(PresenceNotice),
    UserLeft(PresenceNotice),
    SpeakerJoined(PresenceNotice),
    SpeakerLeft(PresenceNotice),
    MessageHistory(MessageHistory),
    FileList(FileList),
    AppStateBroadcast(AppStateBroadcast),
}

impl ServerMessage {
    /// Every tag that decodes into a [`ServerMessage`].
    pub const TAGS: [&'static str; 12] = [
        "connection_established",
        "room_joined",
        "text_message",
        "image_message",
        "file_shared",
        "user_joined",
        "user_left",
        "speaker_joined",
        "speaker_left",
        "message_history",
        "file_list",
        "app_state_broadcast",
    ];

    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished(_) => "connection_established",
            Self::RoomJoined(_) => "room_joined",
            Self::TextMessage(_) => "text_message",
            Self::ImageMessage(_) => "image_message",
            Self::FileShared(_) => "file_shared",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::SpeakerJoined(_) => "speaker_joined",
            Self::SpeakerLeft(_) => "speaker_left",
            Self::MessageHistory(_) => "message_history",
            Self::FileList(_) => "file_list",
            Self::AppStateBroadcast(_) => "app_state_broadcast",
        }
    }

    /// Returns `true` if `tag` names a [`ServerMessage`] variant.
    pub fn is_known_tag(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A message whose tag and shape the client understands.
    Known(ServerMessage),
    /// A message with a tag this client does not know. It is forwarded
    /// undecorated under its own tag and the catch-all `message` event.
    Unknown {
        /// The raw `type` value.
        tag: String,
        /// The complete original object, `type` included.
        payload: Value,
    },
}

impl InboundMessage {
    /// The wire tag, which is also the raw event name this message is emitted under.
    pub fn tag(&self) -> &str {
        match self {
            Self::Known(msg) => msg.tag(),
            Self::Unknown { tag, .. } => tag,
        }
    }

    /// The typed message, if the tag is known.
    pub fn as_known(&self) -> Option<&ServerMessage> {
        match self {
            Self::Known(msg) => Some(msg),
            Self::Unknown { .. } => None,
        }
    }
}

impl From<ServerMessage> for InboundMessage {
    fn from(msg: ServerMessage) -> Self {
        Self::Known(msg)
    }
}

impl Serialize for InboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(msg) => msg.serialize(serializer),
            Self::Unknown { payload, .. } => payload.serialize(serializer),
        }
    }
}
