//! Inbound message routing.
//!
//! For each decoded message the router
//!
//! 1. captures identity (`connection_established`) and room membership
//!    (`room_joined`) into the shared client state,
//! 2. emits the message under its own tag,
//! 3. emits it under the catch-all [`MESSAGE`](event::MESSAGE) event,
//! 4. emits at most one derived event (see [`derive`]).
//!
//! State is updated before any emission so handlers observe the new state.

use tracing::debug;

use crate::bus::EventBus;
use crate::connection::SharedState;
use crate::event::{self, Event, Presence, PresenceChange};
use crate::protocol::{InboundMessage, PresenceNotice, ServerMessage};

/// Classify and fan out one inbound message.
pub(crate) fn route(bus: &EventBus, state: &SharedState, message: InboundMessage) {
    capture_state(state, &message);

    let derived = derive(&message);
    let tag = message.tag().to_owned();
    let raw = Event::Inbound(message);

    bus.emit(&tag, &raw);
    bus.emit(event::MESSAGE, &raw);
    if let Some((name, payload)) = derived {
        bus.emit(name, &payload);
    }
}

/// The derived event for `message`, if its tag has one.
///
/// Chat entries are passed through unchanged; presence notices are reshaped
/// into a [`Presence`]. Unknown tags never derive.
pub fn derive(message: &InboundMessage) -> Option<(&'static str, Event)> {
    let msg = message.as_known()?;
    match msg {
        ServerMessage::TextMessage(_)
        | ServerMessage::ImageMessage(_)
        | ServerMessage::FileShared(_) => {
            Some((event::CHAT_MESSAGE, Event::Inbound(message.clone())))
        }
        ServerMessage::UserJoined(notice) => Some((
            event::USER_PRESENCE,
            Event::UserPresence(presence(PresenceChange::Joined, notice, true)),
        )),
        ServerMessage::UserLeft(notice) => Some((
            event::USER_PRESENCE,
            Event::UserPresence(presence(PresenceChange::Left, notice, false)),
        )),
        ServerMessage::SpeakerJoined(notice) => Some((
            event::VOICE_PRESENCE,
            Event::VoicePresence(presence(PresenceChange::Joined, notice, true)),
        )),
        ServerMessage::SpeakerLeft(notice) => Some((
            event::VOICE_PRESENCE,
            Event::VoicePresence(presence(PresenceChange::Left, notice, true)),
        )),
        ServerMessage::ConnectionEstablished(_)
        | ServerMessage::RoomJoined(_)
        | ServerMessage::MessageHistory(_)
        | ServerMessage::FileList(_)
        | ServerMessage::AppStateBroadcast(_) => None,
    }
}

fn presence(change: PresenceChange, notice: &PresenceNotice, with_user: bool) -> Presence {
    Presence {
        change,
        user_id: notice.user_id.clone(),
        user: if with_user { notice.user.clone() } else { None },
    }
}

fn capture_state(state: &SharedState, message: &InboundMessage) {
    match message.as_known() {
        Some(ServerMessage::ConnectionEstablished(payload)) => {
            debug!(client_id = %payload.client_id, "state: connection established");
            state.set_identity(payload.clone());
        }
        Some(ServerMessage::RoomJoined(payload)) => {
            debug!(room_id = %payload.room_id, "state: joined room");
            state.set_room(payload.room_id.clone());
        }
        _ => {}
    }
}
