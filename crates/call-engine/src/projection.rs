//! Reconciliation projector.
//!
//! [`project`] is the pure, stateless merge of the two independent state
//! machines into the unified participant list. It is recomputed from
//! current state on every change of either input - never patched
//! incrementally - so no upstream failure can corrupt an already-merged
//! view.
//!
//! Identity is authoritative: a transport entry whose transport id has no
//! identity binding is dropped, not rendered. The local participant is
//! emitted only once its own join echo has bound an identity - before
//! that the caller simply isn't in the list yet.

use crate::channel::ChannelState;
use crate::transport::{RemoteLinkState, TransportSnapshot};

/// The local peer's own control flags, held by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalControls {
    pub audio_muted: bool,
    pub video_enabled: bool,
}

impl Default for LocalControls {
    fn default() -> Self {
        Self {
            audio_muted: false,
            video_enabled: true,
        }
    }
}

/// One participant in the unified view.
///
/// Local and remote participants are uniform for display purposes; the
/// remote variant additionally carries its transport binding and link
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Local {
        user_id: String,
        display_name: String,
        is_muted: bool,
        is_video_enabled: bool,
        is_speaking: bool,
    },
    Remote {
        user_id: String,
        display_name: String,
        transport_id: u32,
        link_state: RemoteLinkState,
        is_muted: bool,
        is_video_enabled: bool,
        is_speaking: bool,
    },
}

impl Participant {
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Participant::Local { user_id, .. } | Participant::Remote { user_id, .. } => user_id,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Participant::Local { display_name, .. } | Participant::Remote { display_name, .. } => {
                display_name
            }
        }
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        match self {
            Participant::Local { is_muted, .. } | Participant::Remote { is_muted, .. } => *is_muted,
        }
    }

    #[must_use]
    pub fn is_video_enabled(&self) -> bool {
        match self {
            Participant::Local {
                is_video_enabled, ..
            }
            | Participant::Remote {
                is_video_enabled, ..
            } => *is_video_enabled,
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        match self {
            Participant::Local { is_speaking, .. } | Participant::Remote { is_speaking, .. } => {
                *is_speaking
            }
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Participant::Local { .. })
    }
}

/// Merge transport and identity state into the unified participant list,
/// local participant first.
#[must_use]
pub fn project(
    transport: &TransportSnapshot,
    channel: &ChannelState,
    controls: &LocalControls,
) -> Vec<Participant> {
    let mut participants = Vec::with_capacity(transport.remotes.len() + 1);

    // Local participant: requires both a transport binding and the
    // identity it resolved to (the echoed Joined may not be in yet)
    if let Some(local_id) = transport.local_transport_id {
        if let Some(user) = channel.user_by_transport_id(local_id) {
            participants.push(Participant::Local {
                user_id: user.user_id.clone(),
                display_name: user.display_name.clone(),
                is_muted: controls.audio_muted,
                is_video_enabled: controls.video_enabled,
                is_speaking: transport.local_speaking,
            });
        }
    }

    // Remote entries without an identity binding are not rendered
    for remote in &transport.remotes {
        let Some(user) = channel.user_by_transport_id(remote.transport_id) else {
            continue;
        };
        participants.push(Participant::Remote {
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
            transport_id: remote.transport_id,
            link_state: remote.link_state,
            is_muted: remote.is_muted,
            is_video_enabled: remote.is_video_enabled,
            is_speaking: remote.is_speaking,
        });
    }

    participants
}
