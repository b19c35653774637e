//! Call engine error types.
//!
//! Transient channel/transport trouble (disconnects, reconnects, dropped
//! gossip) is never an error here - it is absorbed by the state machines
//! and repaired by the gossip protocol. These types cover the operations a
//! caller actually invokes: connecting the presence channel and joining or
//! controlling the transport session.

use thiserror::Error;

/// Error reported by an external collaborator (presence channel or media
/// transport client). Opaque to the engine; carried for logging and for
/// mapping into [`EngineError`] at the call sites that surface it.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ClientError(pub String);

/// Call engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Presence channel login was rejected.
    #[error("channel login failed: {0}")]
    ChannelLogin(String),

    /// Presence channel subscription failed.
    #[error("channel subscribe failed: {0}")]
    ChannelSubscribe(String),

    /// A call operation requires the presence channel to be connected.
    #[error("presence channel is not connected")]
    ChannelUnavailable,

    /// The session is at its participant capacity.
    #[error("session is full")]
    SessionFull,

    /// Transport join attempted from a state that does not allow it.
    #[error("already in a call")]
    AlreadyInCall,

    /// The media transport rejected the join outright.
    #[error("transport join rejected: {0}")]
    TransportJoin(String),

    /// A media transport control call failed.
    #[error("transport control failed: {0}")]
    TransportControl(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Internal error (actor mailbox closed, engine shut down).
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns a short caller-safe message with no internal details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            EngineError::ChannelLogin(_) | EngineError::ChannelSubscribe(_) => {
                "Could not connect to the session".to_string()
            }
            EngineError::ChannelUnavailable => "Not connected to the session".to_string(),
            EngineError::SessionFull => "The session is full".to_string(),
            EngineError::AlreadyInCall => "Already in a call".to_string(),
            EngineError::TransportJoin(_) | EngineError::TransportControl(_) => {
                "Could not reach the media service".to_string()
            }
            EngineError::Config(_) | EngineError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
