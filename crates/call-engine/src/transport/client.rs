//! Media transport collaborator interface.
//!
//! The concrete transport (vendor SDK, in-memory fake) is constructed by
//! the embedder; its callback feed is delivered to the engine through an
//! [`EventSender<TransportEvent>`](crate::events::EventSender). Video
//! surface binding stays on the embedder's side of this boundary - the
//! engine only reconciles state.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::ClientError;

/// Command surface of the media transport session.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Join the named session. Returns the immediate acceptance result;
    /// the assigned transport id arrives later as
    /// [`TransportEvent::JoinSuccess`].
    async fn join(
        &self,
        token: Option<&SecretString>,
        channel: &str,
        local_transport_id: u32,
    ) -> Result<(), ClientError>;

    /// Leave the current session.
    async fn leave(&self) -> Result<(), ClientError>;

    /// Mute or unmute the local audio stream.
    async fn mute_local_audio(&self, muted: bool) -> Result<(), ClientError>;

    /// Enable or disable the local video stream.
    async fn enable_local_video(&self, enabled: bool) -> Result<(), ClientError>;

    /// Switch the capture camera.
    async fn switch_camera(&self) -> Result<(), ClientError>;
}

/// Connection state as reported by the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLinkState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
}

/// Remote video stream state as reported by the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteVideoState {
    /// Stream announced, not yet decoding.
    Starting,
    /// Frames are decoding.
    Decoding,
    /// Stream stalled.
    Frozen,
    /// Decoding failed.
    Failed,
    /// Stream stopped by the sender.
    Stopped,
}

/// One entry of a periodic volume indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSample {
    /// Transport id, or [`MIXED_SAMPLE_ID`](super::roster::MIXED_SAMPLE_ID)
    /// for the local/mixed sample.
    pub transport_id: u32,
    /// Volume level, 0-255.
    pub level: u32,
    /// Voice activity flag; only meaningful for the mixed sample.
    pub voice_activity: bool,
}

/// An event delivered by the media transport collaborator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The local join completed; the session assigned our transport id.
    JoinSuccess { transport_id: u32 },
    /// A remote transport joined the session.
    UserJoined { transport_id: u32 },
    /// A remote transport went offline.
    UserOffline { transport_id: u32 },
    /// The session connection state changed.
    LinkStateChanged { state: TransportLinkState },
    /// The session reported an error code.
    Error { code: i32 },
    /// A remote video stream changed state.
    RemoteVideoStateChanged {
        transport_id: u32,
        state: RemoteVideoState,
    },
    /// First decoded frame for a remote stream.
    FirstRemoteFrame { transport_id: u32 },
    /// A remote muted or unmuted audio.
    AudioMuted { transport_id: u32, muted: bool },
    /// A remote enabled or disabled video.
    VideoMuted { transport_id: u32, muted: bool },
    /// Periodic speaker volume indication.
    VolumeIndication { samples: Vec<VolumeSample> },
    /// Periodic session stats.
    Stats { latency_ms: u32 },
}
