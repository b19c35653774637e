//! Media transport side: transport roster, reconnection supervision.
//!
//! The transport session knows nothing about identity - it deals in
//! numeric transport ids assigned at join time. The actor in this module
//! is the single writer for all transport state and drives the
//! reconnect-timeout supervision.

pub mod actor;
pub mod client;
pub mod roster;

pub use actor::{TransportActor, TransportHandle};
pub use client::{
    MediaTransport, RemoteVideoState, TransportEvent, TransportLinkState, VolumeSample,
};
pub use roster::{RemoteLink, RemoteLinkState, TransportRoster, TransportSnapshot};

/// Connection state of the media transport session.
///
/// Independent of the presence channel state; the two machines share no
/// transitions. `Failed` is terminal until an explicit rejoin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConnectionState {
    /// Not in a call.
    Idle,
    /// Join initiated, waiting for the session.
    Joining,
    /// In the call.
    Joined,
    /// Link dropped; the supervisor is timing the recovery.
    Reconnecting,
    /// Left the call (explicitly or after a reconnect timeout).
    Left,
    /// Terminal failure; requires an explicit rejoin.
    Failed(String),
}
