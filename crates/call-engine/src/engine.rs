//! `CallEngine` - the public façade over both state machines.
//!
//! Construction wires the two actors, their event queues and the
//! projector task; there is deliberately no way to start a second
//! ingestion loop for a channel. All state flows out through `watch`
//! receivers that observers can clone and await.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::{
    ChannelActor, ChannelConnectionState, ChannelEvent, ChannelHandle, ChannelState,
    PresenceChannel,
};
use crate::config::Config;
use crate::errors::EngineError;
use crate::events::{queue, EventSender};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::projection::{project, LocalControls, Participant};
use crate::timefmt::now_millis;
use crate::transport::{
    MediaTransport, TransportActor, TransportConnectionState, TransportEvent, TransportHandle,
    TransportSnapshot,
};

/// The reconciliation engine for one call session.
///
/// Owns the identity and transport actors, the projector task and the
/// local control flags. Dropping the engine does not stop the actors;
/// call [`shutdown`](Self::shutdown) for a deterministic teardown.
pub struct CallEngine {
    local_user_id: String,
    media: Arc<dyn MediaTransport>,
    channel: ChannelHandle,
    transport: TransportHandle,
    channel_events: EventSender<ChannelEvent>,
    transport_events: EventSender<TransportEvent>,
    controls_tx: watch::Sender<LocalControls>,
    channel_conn_rx: watch::Receiver<ChannelConnectionState>,
    transport_conn_rx: watch::Receiver<TransportConnectionState>,
    channel_state_rx: watch::Receiver<ChannelState>,
    transport_snapshot_rx: watch::Receiver<TransportSnapshot>,
    participants_rx: watch::Receiver<Vec<Participant>>,
    cancel_token: CancellationToken,
    metrics: Arc<EngineMetrics>,
}

impl CallEngine {
    /// Construct the engine and start its actors.
    ///
    /// The collaborators are constructed by the embedder (that is where
    /// app ids and credentials for the vendor clients live); the engine
    /// receives them ready-made and hands back the event senders their
    /// callback adapters push into.
    #[must_use]
    pub fn new(
        config: Config,
        presence: Arc<dyn PresenceChannel>,
        media: Arc<dyn MediaTransport>,
    ) -> Self {
        let config = Arc::new(config);
        let local_user_id = generate_user_id();
        let cancel_token = CancellationToken::new();
        let metrics = EngineMetrics::new();

        let (channel_events, channel_queue) = queue(config.event_queue_capacity);
        let (transport_events, transport_queue) = queue(config.event_queue_capacity);

        let (channel_conn_tx, channel_conn_rx) = watch::channel(ChannelConnectionState::Idle);
        let (channel_state_tx, channel_state_rx) =
            watch::channel(ChannelState::new(config.max_users));
        let (transport_conn_tx, transport_conn_rx) = watch::channel(TransportConnectionState::Idle);
        let (transport_snapshot_tx, transport_snapshot_rx) =
            watch::channel(TransportSnapshot::empty());
        let (controls_tx, controls_rx) = watch::channel(LocalControls::default());
        let (participants_tx, participants_rx) = watch::channel(Vec::new());

        let (channel, _channel_task) = ChannelActor::spawn(
            Arc::clone(&config),
            local_user_id.clone(),
            presence,
            channel_queue,
            channel_events.clone(),
            channel_conn_tx,
            channel_state_tx,
            Arc::clone(&metrics),
            cancel_token.child_token(),
        );

        let (transport, _transport_task) = TransportActor::spawn(
            Arc::clone(&config),
            local_user_id.clone(),
            Arc::clone(&media),
            channel.clone(),
            transport_queue,
            transport_conn_tx,
            transport_snapshot_tx,
            Arc::clone(&metrics),
            cancel_token.child_token(),
        );

        tokio::spawn(run_projector(
            channel_state_rx.clone(),
            transport_snapshot_rx.clone(),
            controls_rx,
            participants_tx,
            cancel_token.child_token(),
        ));

        info!(
            target: "engine",
            user_id = %local_user_id,
            channel = %config.channel_name,
            "call engine started"
        );

        Self {
            local_user_id,
            media,
            channel,
            transport,
            channel_events,
            transport_events,
            controls_tx,
            channel_conn_rx,
            transport_conn_rx,
            channel_state_rx,
            transport_snapshot_rx,
            participants_rx,
            cancel_token,
            metrics,
        }
    }

    /// The process-generated identity of the local peer.
    #[must_use]
    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Sender the presence channel's callback adapter pushes events into.
    #[must_use]
    pub fn channel_events(&self) -> EventSender<ChannelEvent> {
        self.channel_events.clone()
    }

    /// Sender the media transport's callback adapter pushes events into.
    #[must_use]
    pub fn transport_events(&self) -> EventSender<TransportEvent> {
        self.transport_events.clone()
    }

    /// Connect the presence channel (login, subscribe, request state).
    ///
    /// # Errors
    ///
    /// Login/subscribe rejections surface here; re-entrant calls while
    /// connecting or connected are a no-op `Ok`.
    pub async fn connect_channel(&self) -> Result<(), EngineError> {
        self.channel.connect().await
    }

    /// Disconnect the presence channel and reset identity state.
    ///
    /// # Errors
    ///
    /// `Internal` if the engine is shut down.
    pub async fn disconnect_channel(&self) -> Result<(), EngineError> {
        self.channel.disconnect().await
    }

    /// Join the call under the given display name.
    ///
    /// The join guard requires the presence channel to be connected and
    /// the session to have room; the transport additionally requires an
    /// `Idle`/`Left` state.
    ///
    /// # Errors
    ///
    /// [`EngineError::ChannelUnavailable`], [`EngineError::SessionFull`],
    /// [`EngineError::AlreadyInCall`] or [`EngineError::TransportJoin`].
    pub async fn join_call(&self, display_name: &str) -> Result<(), EngineError> {
        if *self.channel_conn_rx.borrow() != ChannelConnectionState::Connected {
            return Err(EngineError::ChannelUnavailable);
        }
        if !self.channel_state_rx.borrow().can_join() {
            return Err(EngineError::SessionFull);
        }
        self.transport.join(display_name.to_string()).await
    }

    /// Leave the call, broadcasting the departure.
    ///
    /// # Errors
    ///
    /// `Internal` if the engine is shut down.
    pub async fn leave_call(&self) -> Result<(), EngineError> {
        self.transport.leave().await
    }

    /// Mute or unmute the local audio stream.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransportControl`] when the transport call fails.
    pub async fn set_audio_muted(&self, muted: bool) -> Result<(), EngineError> {
        self.media
            .mute_local_audio(muted)
            .await
            .map_err(|e| EngineError::TransportControl(e.to_string()))?;
        self.controls_tx.send_modify(|c| c.audio_muted = muted);
        Ok(())
    }

    /// Enable or disable the local video stream.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransportControl`] when the transport call fails.
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.media
            .enable_local_video(enabled)
            .await
            .map_err(|e| EngineError::TransportControl(e.to_string()))?;
        self.controls_tx.send_modify(|c| c.video_enabled = enabled);
        Ok(())
    }

    /// Switch the capture camera.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransportControl`] when the transport call fails.
    pub async fn switch_camera(&self) -> Result<(), EngineError> {
        self.media
            .switch_camera()
            .await
            .map_err(|e| EngineError::TransportControl(e.to_string()))
    }

    /// The continuously-updated unified participant list.
    #[must_use]
    pub fn participants(&self) -> watch::Receiver<Vec<Participant>> {
        self.participants_rx.clone()
    }

    /// Presence channel connection state.
    #[must_use]
    pub fn channel_connection(&self) -> watch::Receiver<ChannelConnectionState> {
        self.channel_conn_rx.clone()
    }

    /// Media transport connection state.
    #[must_use]
    pub fn transport_connection(&self) -> watch::Receiver<TransportConnectionState> {
        self.transport_conn_rx.clone()
    }

    /// Identity roster and session metadata.
    #[must_use]
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.channel_state_rx.clone()
    }

    /// Transport-layer view (local binding, remotes, speaking, latency).
    #[must_use]
    pub fn transport_snapshot(&self) -> watch::Receiver<TransportSnapshot> {
        self.transport_snapshot_rx.clone()
    }

    /// Engine counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Events evicted from the (channel, transport) queues by overflow.
    #[must_use]
    pub fn events_dropped(&self) -> (u64, u64) {
        (
            self.channel_events.dropped(),
            self.transport_events.dropped(),
        )
    }

    /// Stop both actors and the projector immediately.
    ///
    /// Cancellation is the only stop mechanism: in-flight state mutation
    /// halts at the next await point and no further events are processed.
    pub fn shutdown(&self) {
        debug!(target: "engine", "shutting down");
        self.cancel_token.cancel();
    }
}

/// Recompute the participant projection on every change of any input.
async fn run_projector(
    mut channel_state_rx: watch::Receiver<ChannelState>,
    mut transport_rx: watch::Receiver<TransportSnapshot>,
    mut controls_rx: watch::Receiver<LocalControls>,
    participants_tx: watch::Sender<Vec<Participant>>,
    cancel_token: CancellationToken,
) {
    loop {
        let next = {
            let transport = transport_rx.borrow_and_update();
            let channel = channel_state_rx.borrow_and_update();
            let controls = controls_rx.borrow_and_update();
            project(&transport, &channel, &controls)
        };
        participants_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        tokio::select! {
            () = cancel_token.cancelled() => break,
            result = channel_state_rx.changed() => {
                if result.is_err() {
                    break;
                }
            }
            result = transport_rx.changed() => {
                if result.is_err() {
                    break;
                }
            }
            result = controls_rx.changed() => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
    debug!(target: "engine", "projector stopped");
}

/// Generate the process-scoped local identity token.
fn generate_user_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("user_{}_{suffix:04}", now_millis())
}
