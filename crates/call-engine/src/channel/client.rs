//! Presence channel collaborator interface.
//!
//! The concrete client (vendor SDK, in-memory fake) is constructed by the
//! embedder and handed to the engine as a trait object. Its callbacks are
//! delivered back to the engine through an
//! [`EventSender<ChannelEvent>`](crate::events::EventSender) from whatever
//! execution context the client uses.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::ClientError;

/// Command surface of the presence/messaging channel.
///
/// `publish` is fire-and-forget from the engine's perspective: the engine
/// never awaits confirmation inline, and a failure comes back as a
/// [`ChannelEvent::PublishFailed`] observation. Delivery is at-most-once;
/// convergence relies on subsequent gossip rounds, not retries.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// Authenticate the client.
    async fn login(&self, token: &SecretString) -> Result<(), ClientError>;

    /// Subscribe to a named channel, optionally receiving message payloads.
    async fn subscribe(&self, channel: &str, with_messages: bool) -> Result<(), ClientError>;

    /// Publish an opaque payload to a named channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ClientError>;

    /// Unsubscribe from a named channel.
    async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError>;

    /// End the authenticated session.
    async fn logout(&self) -> Result<(), ClientError>;
}

/// Link state as reported by the presence channel client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLinkState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed(String),
}

/// An event delivered by the presence channel collaborator.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The link state changed.
    LinkState(ChannelLinkState),
    /// An inbound message payload (opaque string, gossip-encoded).
    Message(String),
    /// A channel-level presence notification. Not used for identity -
    /// identity comes only from gossip payloads.
    Presence { publisher_id: String },
    /// An earlier fire-and-forget publish failed.
    PublishFailed(String),
}
