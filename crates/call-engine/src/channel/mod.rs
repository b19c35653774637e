//! Presence channel side: identity roster, gossip handling, connection
//! orchestration.
//!
//! Identity lives entirely in gossip payloads exchanged over the presence
//! channel; presence events from the channel itself are not used. The
//! actor in this module is the single writer for all identity state.

pub mod actor;
pub mod client;
pub mod roster;

pub use actor::{ChannelActor, ChannelHandle};
pub use client::{ChannelEvent, ChannelLinkState, PresenceChannel};
pub use roster::{CallUser, ChannelState, IdentityRoster, LocalBinding};

/// Connection state of the presence channel.
///
/// Independent of the transport connection state; the two machines share
/// no transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConnectionState {
    /// No connection attempted or torn down.
    Idle,
    /// Login/subscribe sequence in flight.
    Connecting,
    /// Subscribed and receiving messages.
    Connected,
    /// Link dropped, client is re-establishing.
    Reconnecting,
    /// Link is down.
    Disconnected,
    /// Terminal failure; requires an explicit reconnect.
    Failed(String),
}
