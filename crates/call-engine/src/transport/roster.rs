//! Transport state machine.
//!
//! [`TransportRoster`] tracks the media-layer view of the session: which
//! transport ids are live, their mute/video/speaking flags and link
//! state, plus the local binding, speaking flag and network latency. It
//! knows nothing about identity; entries that never gain one are filtered
//! out by the projector downstream.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::client::{RemoteVideoState, VolumeSample};

/// Transport id of the local/mixed volume sample.
pub const MIXED_SAMPLE_ID: u32 = 0;

/// Link state of one remote transport entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteLinkState {
    /// Joined, no media flowing yet.
    Connecting,
    /// Media decoding.
    Connected,
    /// Media stalled or failed; may recover.
    Reconnecting,
}

/// One remote transport entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLink {
    pub transport_id: u32,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub is_speaking: bool,
    pub link_state: RemoteLinkState,
}

impl RemoteLink {
    fn new(transport_id: u32) -> Self {
        Self {
            transport_id,
            is_muted: false,
            is_video_enabled: true,
            is_speaking: false,
            link_state: RemoteLinkState::Connecting,
        }
    }
}

/// Cloneable view of the transport state, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSnapshot {
    /// The transport id assigned to the local peer, once joined.
    pub local_transport_id: Option<u32>,
    /// Remote entries in arrival order.
    pub remotes: Vec<RemoteLink>,
    /// Whether the local peer is currently speaking.
    pub local_speaking: bool,
    /// Last observed network latency, milliseconds.
    pub latency_ms: Option<u32>,
}

impl TransportSnapshot {
    /// An empty snapshot (nobody joined).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            local_transport_id: None,
            remotes: Vec::new(),
            local_speaking: false,
            latency_ms: None,
        }
    }
}

/// Transport state machine. Mutated only by the transport actor.
#[derive(Debug)]
pub struct TransportRoster {
    remotes: Vec<RemoteLink>,
    /// Last qualifying speech sample per transport id (monotonic clock).
    last_spoke: HashMap<u32, Instant>,
    local_transport_id: Option<u32>,
    local_speaking: bool,
    latency_ms: Option<u32>,
    speaking_hold: Duration,
    speaking_volume_threshold: u32,
}

impl TransportRoster {
    /// Create an empty roster with the given speaking detection tuning.
    #[must_use]
    pub fn new(speaking_hold: Duration, speaking_volume_threshold: u32) -> Self {
        Self {
            remotes: Vec::new(),
            last_spoke: HashMap::new(),
            local_transport_id: None,
            local_speaking: false,
            latency_ms: None,
            speaking_hold,
            speaking_volume_threshold,
        }
    }

    /// The local peer's transport id, once assigned.
    #[must_use]
    pub fn local_transport_id(&self) -> Option<u32> {
        self.local_transport_id
    }

    /// Record the local join result.
    pub fn bind_local(&mut self, transport_id: u32) {
        self.local_transport_id = Some(transport_id);
    }

    /// A remote transport joined. Duplicate joins are ignored; identity
    /// for this entry arrives separately over the presence channel.
    pub fn remote_joined(&mut self, transport_id: u32) {
        if self.remotes.iter().any(|r| r.transport_id == transport_id) {
            return;
        }
        self.remotes.push(RemoteLink::new(transport_id));
    }

    /// A remote transport went offline. Returns whether it was known.
    pub fn remote_offline(&mut self, transport_id: u32) -> bool {
        let before = self.remotes.len();
        self.remotes.retain(|r| r.transport_id != transport_id);
        self.last_spoke.remove(&transport_id);
        self.remotes.len() != before
    }

    /// Map a remote video-state report onto the entry's link state.
    ///
    /// Transient signal states (`Starting`, `Stopped`) leave the link
    /// state unchanged so it never regresses on noise.
    pub fn apply_remote_video_state(&mut self, transport_id: u32, state: RemoteVideoState) {
        let next = match state {
            RemoteVideoState::Decoding => Some(RemoteLinkState::Connected),
            RemoteVideoState::Frozen | RemoteVideoState::Failed => {
                Some(RemoteLinkState::Reconnecting)
            }
            RemoteVideoState::Starting | RemoteVideoState::Stopped => None,
        };
        if let Some(link_state) = next {
            self.update_remote(transport_id, |r| r.link_state = link_state);
        }
    }

    /// First decoded frame: the entry is live.
    pub fn apply_first_frame(&mut self, transport_id: u32) {
        self.update_remote(transport_id, |r| r.link_state = RemoteLinkState::Connected);
    }

    pub fn apply_audio_muted(&mut self, transport_id: u32, muted: bool) {
        self.update_remote(transport_id, |r| r.is_muted = muted);
    }

    pub fn apply_video_muted(&mut self, transport_id: u32, muted: bool) {
        self.update_remote(transport_id, |r| r.is_video_enabled = !muted);
    }

    /// Fold a periodic volume indication into the speaking flags.
    ///
    /// A sample qualifies as speech above the volume threshold, except
    /// the mixed sample (id 0) which carries an explicit voice-activity
    /// flag. Flags stay raised for the hold window after the last
    /// qualifying sample, so indicators don't flicker between
    /// consecutive silent reports.
    pub fn apply_volume(&mut self, samples: &[VolumeSample], now: Instant) {
        for sample in samples {
            let active = if sample.transport_id == MIXED_SAMPLE_ID {
                sample.voice_activity
            } else {
                sample.level > self.speaking_volume_threshold
            };
            if active {
                self.last_spoke.insert(sample.transport_id, now);
            }
        }

        self.local_speaking = self.within_hold(MIXED_SAMPLE_ID, now);
        let hold = self.speaking_hold;
        let last_spoke = &self.last_spoke;
        for remote in &mut self.remotes {
            remote.is_speaking = last_spoke
                .get(&remote.transport_id)
                .is_some_and(|at| now.duration_since(*at) < hold);
        }
    }

    /// Record a latency sample; zero means "no measurement yet".
    pub fn apply_latency(&mut self, latency_ms: u32) {
        if latency_ms > 0 {
            self.latency_ms = Some(latency_ms);
        }
    }

    /// Drop all state on leave/disconnect.
    pub fn clear(&mut self) {
        self.remotes.clear();
        self.last_spoke.clear();
        self.local_transport_id = None;
        self.local_speaking = false;
        self.latency_ms = None;
    }

    /// Current published view.
    #[must_use]
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            local_transport_id: self.local_transport_id,
            remotes: self.remotes.clone(),
            local_speaking: self.local_speaking,
            latency_ms: self.latency_ms,
        }
    }

    fn within_hold(&self, transport_id: u32, now: Instant) -> bool {
        self.last_spoke
            .get(&transport_id)
            .is_some_and(|at| now.duration_since(*at) < self.speaking_hold)
    }

    fn update_remote(&mut self, transport_id: u32, apply: impl FnOnce(&mut RemoteLink)) {
        if let Some(remote) = self
            .remotes
            .iter_mut()
            .find(|r| r.transport_id == transport_id)
        {
            apply(remote);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn roster() -> TransportRoster {
        TransportRoster::new(Duration::from_millis(500), 40)
    }

    fn sample(transport_id: u32, level: u32) -> VolumeSample {
        VolumeSample {
            transport_id,
            level,
            voice_activity: false,
        }
    }

    #[test]
    fn test_remote_join_is_idempotent() {
        let mut r = roster();
        r.remote_joined(7);
        r.remote_joined(7);

        let snapshot = r.snapshot();
        assert_eq!(snapshot.remotes.len(), 1);
        assert_eq!(snapshot.remotes[0].link_state, RemoteLinkState::Connecting);
        assert!(snapshot.remotes[0].is_video_enabled);
        assert!(!snapshot.remotes[0].is_muted);
    }

    #[test]
    fn test_remote_offline_removes_entry() {
        let mut r = roster();
        r.remote_joined(7);
        r.remote_joined(8);

        assert!(r.remote_offline(7));
        assert!(!r.remote_offline(7));
        assert_eq!(r.snapshot().remotes.len(), 1);
        assert_eq!(r.snapshot().remotes[0].transport_id, 8);
    }

    #[test]
    fn test_video_state_mapping() {
        let mut r = roster();
        r.remote_joined(7);

        r.apply_remote_video_state(7, RemoteVideoState::Decoding);
        assert_eq!(r.snapshot().remotes[0].link_state, RemoteLinkState::Connected);

        r.apply_remote_video_state(7, RemoteVideoState::Frozen);
        assert_eq!(
            r.snapshot().remotes[0].link_state,
            RemoteLinkState::Reconnecting
        );

        // Transient states never regress an established link state
        r.apply_remote_video_state(7, RemoteVideoState::Decoding);
        r.apply_remote_video_state(7, RemoteVideoState::Starting);
        assert_eq!(r.snapshot().remotes[0].link_state, RemoteLinkState::Connected);
        r.apply_remote_video_state(7, RemoteVideoState::Stopped);
        assert_eq!(r.snapshot().remotes[0].link_state, RemoteLinkState::Connected);
    }

    #[test]
    fn test_first_frame_connects() {
        let mut r = roster();
        r.remote_joined(7);
        r.apply_first_frame(7);
        assert_eq!(r.snapshot().remotes[0].link_state, RemoteLinkState::Connected);
    }

    #[test]
    fn test_mute_flags() {
        let mut r = roster();
        r.remote_joined(7);

        r.apply_audio_muted(7, true);
        r.apply_video_muted(7, true);
        let snapshot = r.snapshot();
        assert!(snapshot.remotes[0].is_muted);
        assert!(!snapshot.remotes[0].is_video_enabled);

        // Updates for unknown ids are dropped
        r.apply_audio_muted(99, true);
        assert_eq!(r.snapshot().remotes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaking_threshold_and_hold() {
        let mut r = roster();
        r.remote_joined(7);

        let t0 = Instant::now();
        r.apply_volume(&[sample(7, 41)], t0);
        assert!(r.snapshot().remotes[0].is_speaking);

        // A silent sample inside the hold window keeps the flag up
        tokio::time::advance(Duration::from_millis(300)).await;
        r.apply_volume(&[sample(7, 0)], Instant::now());
        assert!(r.snapshot().remotes[0].is_speaking);

        // Past the hold window the flag drops
        tokio::time::advance(Duration::from_millis(300)).await;
        r.apply_volume(&[sample(7, 0)], Instant::now());
        assert!(!r.snapshot().remotes[0].is_speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_is_exclusive() {
        let mut r = roster();
        r.remote_joined(7);

        r.apply_volume(&[sample(7, 40)], Instant::now());
        assert!(!r.snapshot().remotes[0].is_speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_speaking_uses_voice_activity() {
        let mut r = roster();

        // High level without voice activity does not count for the mixed sample
        r.apply_volume(
            &[VolumeSample {
                transport_id: MIXED_SAMPLE_ID,
                level: 200,
                voice_activity: false,
            }],
            Instant::now(),
        );
        assert!(!r.snapshot().local_speaking);

        r.apply_volume(
            &[VolumeSample {
                transport_id: MIXED_SAMPLE_ID,
                level: 10,
                voice_activity: true,
            }],
            Instant::now(),
        );
        assert!(r.snapshot().local_speaking);
    }

    #[test]
    fn test_latency_ignores_zero() {
        let mut r = roster();
        r.apply_latency(0);
        assert_eq!(r.snapshot().latency_ms, None);

        r.apply_latency(72);
        assert_eq!(r.snapshot().latency_ms, Some(72));

        r.apply_latency(0);
        assert_eq!(r.snapshot().latency_ms, Some(72));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut r = roster();
        r.bind_local(3);
        r.remote_joined(7);
        r.apply_latency(50);

        r.clear();
        assert_eq!(r.snapshot(), TransportSnapshot::empty());
    }
}
