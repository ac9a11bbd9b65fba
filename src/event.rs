//! Events emitted by the client and the names they are emitted under.
//!
//! Every inbound message is emitted under its own tag (see
//! [`ServerMessage::TAGS`](crate::protocol::ServerMessage::TAGS)) and under
//! [`MESSAGE`]. Some tags additionally produce a derived event:
//!
//! | raw tag | derived event |
//! |---|---|
//! | `text_message`, `image_message`, `file_shared` | [`CHAT_MESSAGE`] (same payload) |
//! | `user_joined`, `user_left` | [`USER_PRESENCE`] |
//! | `speaker_joined`, `speaker_left` | [`VOICE_PRESENCE`] |

use serde::{Deserialize, Serialize};

use crate::protocol::{Id, InboundMessage, ServerMessage, UserProfile};

/// Transport opened.
pub const CONNECTED: &str = "connected";
/// Transport closed, failed to open, or was closed by the caller.
pub const DISCONNECTED: &str = "disconnected";
/// Transport, connect or decode failure.
pub const ERROR: &str = "error";
/// Catch-all: every inbound message.
pub const MESSAGE: &str = "message";
pub const CONNECTION_ESTABLISHED: &str = "connection_established";
pub const ROOM_JOINED: &str = "room_joined";
pub const MESSAGE_HISTORY: &str = "message_history";
pub const FILE_LIST: &str = "file_list";
pub const APP_STATE_BROADCAST: &str = "app_state_broadcast";
pub const CHAT_MESSAGE: &str = "chat_message";
pub const USER_PRESENCE: &str = "user_presence";
pub const VOICE_PRESENCE: &str = "voice_presence";

/// Direction of a presence change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceChange {
    Joined,
    Left,
}

/// Payload of [`USER_PRESENCE`] and [`VOICE_PRESENCE`].
///
/// Serializes as `{"type":"joined","userId":..,"user":..}`; `user` is omitted
/// when the server did not send one (as for `user_left`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    #[serde(rename = "type")]
    pub change: PresenceChange,
    pub user_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// What failed, for [`ERROR`] events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connector could not open a transport.
    Connect,
    /// The open transport failed to send or receive.
    Transport,
    /// An inbound frame could not be decoded; the frame was dropped.
    Decode,
}

/// Payload of [`ERROR`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

/// Payload of [`DISCONNECTED`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisconnectInfo {
    /// Human-readable cause, if known.
    pub reason: Option<String>,
    /// `true` when the close was requested through `disconnect()`.
    pub by_caller: bool,
    /// `true` when a reconnect attempt is scheduled.
    pub will_reconnect: bool,
}

/// A payload delivered to event handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Emitted under [`CONNECTED`].
    Connected,
    /// Emitted under [`DISCONNECTED`].
    Disconnected(DisconnectInfo),
    /// Emitted under [`ERROR`].
    Error(ErrorEvent),
    /// A decoded inbound message, emitted under its tag, [`MESSAGE`] and,
    /// for chat entries, [`CHAT_MESSAGE`].
    Inbound(InboundMessage),
    /// Emitted under [`USER_PRESENCE`].
    UserPresence(Presence),
    /// Emitted under [`VOICE_PRESENCE`].
    VoicePresence(Presence),
}

impl Event {
    /// The inbound message carried by this event, if any.
    pub fn inbound(&self) -> Option<&InboundMessage> {
        match self {
            Self::Inbound(msg) => Some(msg),
            _ => None,
        }
    }

    /// The typed server message carried by this event, if any.
    pub fn server_message(&self) -> Option<&ServerMessage> {
        self.inbound().and_then(InboundMessage::as_known)
    }

    /// The presence payload of a user or voice presence event.
    pub fn presence(&self) -> Option<&Presence> {
        match self {
            Self::UserPresence(p) | Self::VoicePresence(p) => Some(p),
            _ => None,
        }
    }
}
