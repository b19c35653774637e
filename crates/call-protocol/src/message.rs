//! Gossip message kinds and their JSON codec.
//!
//! Wire format (field-stable across versions): every payload is a JSON
//! object carrying a `type` discriminator in
//! `{JOINED, LEFT, STATE_REQUEST, STATE_ANNOUNCE}`. Field names are
//! camelCase and must not change; peers running older builds parse the
//! same payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec errors.
///
/// Both variants are expected in normal operation: the presence channel
/// is a shared medium and may carry payloads from newer peers or other
/// tools. Callers drop the payload and move on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON or is missing required fields.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload parsed but carries a `type` this build does not know.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

/// A gossip message exchanged over the presence channel.
///
/// `Joined`/`Left` announce transport membership changes as they happen;
/// `StateRequest`/`StateAnnounce` implement the pull-based repair path
/// used after reconnects and missed messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GossipMessage {
    /// A peer bound its identity to a transport session.
    #[serde(rename = "JOINED", rename_all = "camelCase")]
    Joined {
        user_id: String,
        display_name: String,
        transport_id: u32,
        /// Sender's wall clock, epoch milliseconds.
        timestamp: i64,
    },

    /// A peer left the transport session (or was observed going offline).
    #[serde(rename = "LEFT", rename_all = "camelCase")]
    Left {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transport_id: Option<u32>,
        timestamp: i64,
    },

    /// Ask every bound peer to announce its view of the session.
    #[serde(rename = "STATE_REQUEST", rename_all = "camelCase")]
    StateRequest { requester_id: String, timestamp: i64 },

    /// One peer's view of its own binding, sent in response to a request.
    #[serde(rename = "STATE_ANNOUNCE", rename_all = "camelCase")]
    StateAnnounce {
        user_id: String,
        display_name: String,
        transport_id: u32,
        /// Earliest session start the announcer knows of, epoch
        /// milliseconds. Absent when the announcer never observed one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_start_time: Option<i64>,
        timestamp: i64,
    },
}

/// Lightweight envelope for probing the `type` discriminator without a
/// full decode.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

const KNOWN_KINDS: [&str; 4] = ["JOINED", "LEFT", "STATE_REQUEST", "STATE_ANNOUNCE"];

/// Encode a message to its JSON wire form.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails, which
/// cannot happen for well-formed messages.
pub fn encode(message: &GossipMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a payload received from the presence channel.
///
/// The `type` discriminator is probed first so payloads from unknown
/// senders fail cheaply with [`ProtocolError::UnknownKind`] instead of a
/// generic parse error.
///
/// # Errors
///
/// [`ProtocolError::Malformed`] for invalid JSON or missing fields,
/// [`ProtocolError::UnknownKind`] for an unrecognized discriminator.
pub fn decode(payload: &str) -> Result<GossipMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(payload)?;
    if !KNOWN_KINDS.contains(&envelope.kind.as_str()) {
        return Err(ProtocolError::UnknownKind(envelope.kind));
    }
    Ok(serde_json::from_str(payload)?)
}
