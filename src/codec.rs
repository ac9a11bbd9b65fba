//! JSON wire codec.
//!
//! Outbound messages are serialized to a single JSON text frame. Inbound
//! frames are parsed into a generic object first so that an unrecognized
//! `type` can still be forwarded; known tags are then decoded strictly.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CollabError, Result};
use crate::protocol::{InboundMessage, ServerMessage};

/// Serialize a message to its wire text.
///
/// # Errors
///
/// Returns [`CollabError::Serialization`] if the value cannot be represented as JSON.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Deserialize wire text into a concrete message type.
///
/// # Errors
///
/// Returns [`CollabError::Serialization`] if the text does not match `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Fails if the frame is not a JSON object with a string `type`, or if a
/// known tag carries fields that do not match its payload shape.
pub fn decode_inbound(text: &str) -> Result<InboundMessage> {
    classify(serde_json::from_str(text)?)
}

/// Decode one inbound binary frame holding UTF-8 JSON.
///
/// # Errors
///
/// Same as [`decode_inbound`].
pub fn decode_inbound_bytes(bytes: &[u8]) -> Result<InboundMessage> {
    classify(serde_json::from_slice(bytes)?)
}

fn classify(value: Value) -> Result<InboundMessage> {
    let tag = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => {
            return Err(CollabError::Decode(format!(
                "`type` must be a string, got {other}"
            )))
        }
        None => return Err(CollabError::Decode("missing `type` field".into())),
    };

    if ServerMessage::is_known_tag(&tag) {
        Ok(InboundMessage::Known(serde_json::from_value(value)?))
    } else {
        Ok(InboundMessage::Unknown {
            tag,
            payload: value,
        })
    }
}
