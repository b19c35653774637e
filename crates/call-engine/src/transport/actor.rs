//! `TransportActor` - single writer for transport state, plus the
//! reconnection supervisor.
//!
//! The actor ingests the media transport's callback feed through a
//! bounded drop-oldest queue and publishes its projections
//! (`TransportConnectionState`, [`TransportSnapshot`]) through `watch`
//! channels. Identity-relevant transport facts (own join, remote offline,
//! own leave) are forwarded to the channel actor as gossip.
//!
//! # Reconnection supervision
//!
//! A `Reconnecting`/`Disconnected` link report arms a bounded timeout on
//! a spawned sleep holding a child cancellation token. Any superseding
//! transition cancels the token, so a stale expiry can never fire after
//! the state has already resolved. If the timeout expires while the
//! session is still `Reconnecting`, the actor forces a full leave.

use std::sync::Arc;

use call_protocol::GossipMessage;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::channel::ChannelHandle;
use crate::config::Config;
use crate::errors::EngineError;
use crate::events::EventQueue;
use crate::metrics::EngineMetrics;
use crate::timefmt::now_millis;

use super::client::{MediaTransport, TransportEvent, TransportLinkState};
use super::roster::TransportRoster;
use super::TransportConnectionState;

/// Mailbox buffer for caller commands.
const TRANSPORT_COMMAND_BUFFER: usize = 64;

/// Fallback display name when a join races ahead of one being set.
const DEFAULT_DISPLAY_NAME: &str = "User";

/// Messages sent to the `TransportActor`.
pub enum TransportCommand {
    /// Join the transport session under the given display name.
    Join {
        display_name: String,
        respond_to: oneshot::Sender<Result<(), EngineError>>,
    },

    /// Leave the session and broadcast the departure.
    Leave { respond_to: oneshot::Sender<()> },

    /// Internal: the armed reconnect timeout expired.
    ReconnectTimedOut,
}

/// Handle to the `TransportActor`.
#[derive(Clone)]
pub struct TransportHandle {
    sender: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    /// Join the transport session.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyInCall`] from any state other than
    /// `Idle`/`Left`, [`EngineError::TransportJoin`] when the transport
    /// rejects the join outright, `Internal` if the actor is gone.
    pub async fn join(&self, display_name: String) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransportCommand::Join {
                display_name,
                respond_to: tx,
            })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| EngineError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the transport session.
    ///
    /// # Errors
    ///
    /// `Internal` if the actor is gone.
    pub async fn leave(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransportCommand::Leave { respond_to: tx })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| EngineError::Internal(format!("response receive failed: {e}")))
    }
}

/// The `TransportActor` implementation.
pub struct TransportActor {
    config: Arc<Config>,
    local_user_id: String,
    client: Arc<dyn MediaTransport>,
    channel: ChannelHandle,
    receiver: mpsc::Receiver<TransportCommand>,
    /// Sender for the reconnect timeout follow-up.
    self_sender: mpsc::Sender<TransportCommand>,
    events: EventQueue<TransportEvent>,
    roster: TransportRoster,
    display_name: Option<String>,
    /// Token guarding the armed reconnect timeout, if any.
    reconnect_guard: Option<CancellationToken>,
    cancel_token: CancellationToken,
    conn_tx: watch::Sender<TransportConnectionState>,
    snapshot_tx: watch::Sender<super::TransportSnapshot>,
    metrics: Arc<EngineMetrics>,
}

impl TransportActor {
    /// Spawn the actor. Returns a handle and the task join handle.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: Arc<Config>,
        local_user_id: String,
        client: Arc<dyn MediaTransport>,
        channel: ChannelHandle,
        events: EventQueue<TransportEvent>,
        conn_tx: watch::Sender<TransportConnectionState>,
        snapshot_tx: watch::Sender<super::TransportSnapshot>,
        metrics: Arc<EngineMetrics>,
        cancel_token: CancellationToken,
    ) -> (TransportHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(TRANSPORT_COMMAND_BUFFER);

        let roster = TransportRoster::new(config.speaking_hold, config.speaking_volume_threshold);
        let actor = Self {
            config,
            local_user_id,
            client,
            channel,
            receiver,
            self_sender: sender.clone(),
            events,
            roster,
            display_name: None,
            reconnect_guard: None,
            cancel_token,
            conn_tx,
            snapshot_tx,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        (TransportHandle { sender }, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "engine.transport", fields(user_id = %self.local_user_id))]
    async fn run(mut self) {
        info!(target: "engine.transport", "TransportActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "engine.transport", "TransportActor cancelled");
                    break;
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "engine.transport", "command channel closed, exiting");
                            break;
                        }
                    }
                }

                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            self.metrics.record_transport_event();
                            self.handle_event(event).await;
                        }
                        None => {
                            debug!(target: "engine.transport", "event feed closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "engine.transport", "TransportActor stopped");
    }

    async fn handle_command(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Join {
                display_name,
                respond_to,
            } => {
                let result = self.handle_join(display_name).await;
                let _ = respond_to.send(result);
            }
            TransportCommand::Leave { respond_to } => {
                self.leave_session().await;
                let _ = respond_to.send(());
            }
            TransportCommand::ReconnectTimedOut => {
                if *self.conn_tx.borrow() == TransportConnectionState::Reconnecting {
                    warn!(
                        target: "engine.transport",
                        timeout = ?self.config.reconnect_timeout,
                        "reconnect timed out, leaving session"
                    );
                    self.leave_session().await;
                }
            }
        }
    }

    /// Join from `Idle` or `Left` only; `Left` resets to `Idle` first.
    async fn handle_join(&mut self, display_name: String) -> Result<(), EngineError> {
        let state = self.conn_tx.borrow().clone();
        match state {
            TransportConnectionState::Idle => {}
            TransportConnectionState::Left => {
                self.set_state(TransportConnectionState::Idle);
            }
            _ => return Err(EngineError::AlreadyInCall),
        }

        self.display_name = Some(display_name);
        self.set_state(TransportConnectionState::Joining);

        let result = self
            .client
            .join(
                self.config.transport_token.as_ref(),
                &self.config.channel_name,
                0,
            )
            .await;

        if let Err(err) = result {
            // A rejected join never wedges the state machine
            self.display_name = None;
            self.set_state(TransportConnectionState::Idle);
            return Err(EngineError::TransportJoin(err.to_string()));
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::JoinSuccess { transport_id } => {
                self.roster.bind_local(transport_id);
                self.publish_snapshot();
                self.set_state(TransportConnectionState::Joined);
                self.gossip_joined(transport_id).await;
            }

            TransportEvent::UserJoined { transport_id } => {
                self.roster.remote_joined(transport_id);
                self.publish_snapshot();
            }

            TransportEvent::UserOffline { transport_id } => {
                self.roster.remote_offline(transport_id);
                self.publish_snapshot();
                // Translate into a synthetic leave on the identity side
                if let Err(err) = self.channel.remote_offline(transport_id).await {
                    debug!(target: "engine.transport", error = %err, "channel actor unavailable");
                }
            }

            TransportEvent::LinkStateChanged { state } => self.handle_link_state(state).await,

            TransportEvent::Error { code } => {
                let reason = map_error_code(code);
                warn!(target: "engine.transport", code, reason = %reason, "transport error");
                self.cancel_reconnect_guard();
                self.set_state(TransportConnectionState::Failed(reason));
            }

            TransportEvent::RemoteVideoStateChanged {
                transport_id,
                state,
            } => {
                self.roster.apply_remote_video_state(transport_id, state);
                self.publish_snapshot();
            }

            TransportEvent::FirstRemoteFrame { transport_id } => {
                self.roster.apply_first_frame(transport_id);
                self.publish_snapshot();
            }

            TransportEvent::AudioMuted {
                transport_id,
                muted,
            } => {
                self.roster.apply_audio_muted(transport_id, muted);
                self.publish_snapshot();
            }

            TransportEvent::VideoMuted {
                transport_id,
                muted,
            } => {
                self.roster.apply_video_muted(transport_id, muted);
                self.publish_snapshot();
            }

            TransportEvent::VolumeIndication { samples } => {
                self.roster.apply_volume(&samples, Instant::now());
                self.publish_snapshot();
            }

            TransportEvent::Stats { latency_ms } => {
                self.roster.apply_latency(latency_ms);
                self.publish_snapshot();
            }
        }
    }

    async fn handle_link_state(&mut self, state: TransportLinkState) {
        match state {
            TransportLinkState::Connecting => {
                self.set_state(TransportConnectionState::Joining);
            }

            TransportLinkState::Connected => {
                self.cancel_reconnect_guard();
                let was_reconnecting =
                    *self.conn_tx.borrow() == TransportConnectionState::Reconnecting;
                self.set_state(TransportConnectionState::Joined);

                // Peers may have dropped our identity while we were gone;
                // re-announce the binding to repair it.
                if was_reconnecting {
                    if let Some(transport_id) = self.roster.local_transport_id() {
                        debug!(
                            target: "engine.transport",
                            transport_id,
                            "recovered from reconnect, re-announcing"
                        );
                        self.gossip_joined(transport_id).await;
                    }
                }
            }

            TransportLinkState::Reconnecting | TransportLinkState::Disconnected => {
                self.set_state(TransportConnectionState::Reconnecting);
                self.arm_reconnect_timeout();
            }

            TransportLinkState::Failed => {
                self.cancel_reconnect_guard();
                self.set_state(TransportConnectionState::Failed(
                    "Connection failed".to_string(),
                ));
            }
        }
    }

    /// Broadcast our identity/transport binding.
    async fn gossip_joined(&self, transport_id: u32) {
        let display_name = self
            .display_name
            .clone()
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        let message = GossipMessage::Joined {
            user_id: self.local_user_id.clone(),
            display_name,
            transport_id,
            timestamp: now_millis(),
        };
        if let Err(err) = self.channel.publish(message).await {
            debug!(target: "engine.transport", error = %err, "channel actor unavailable");
        }
    }

    /// Leave: broadcast departure, drop the session, clear state.
    async fn leave_session(&mut self) {
        self.cancel_reconnect_guard();

        if let Some(transport_id) = self.roster.local_transport_id() {
            let message = GossipMessage::Left {
                user_id: self.local_user_id.clone(),
                transport_id: Some(transport_id),
                timestamp: now_millis(),
            };
            if let Err(err) = self.channel.publish(message).await {
                debug!(target: "engine.transport", error = %err, "channel actor unavailable");
            }
        }

        if let Err(err) = self.client.leave().await {
            debug!(target: "engine.transport", error = %err, "transport leave failed");
        }

        self.roster.clear();
        self.publish_snapshot();
        self.display_name = None;
        self.set_state(TransportConnectionState::Left);

        info!(target: "engine.transport", "left transport session");
    }

    /// Arm (or re-arm) the bounded reconnect timeout.
    fn arm_reconnect_timeout(&mut self) {
        self.cancel_reconnect_guard();

        let token = self.cancel_token.child_token();
        self.reconnect_guard = Some(token.clone());

        let timeout = self.config.reconnect_timeout;
        let sender = self.self_sender.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let _ = sender.send(TransportCommand::ReconnectTimedOut).await;
                }
            }
        });
    }

    fn cancel_reconnect_guard(&mut self) {
        if let Some(token) = self.reconnect_guard.take() {
            token.cancel();
        }
    }

    fn set_state(&self, state: TransportConnectionState) {
        self.conn_tx.send_replace(state);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.roster.snapshot());
    }
}

/// Map a transport error code to a user-facing reason.
fn map_error_code(code: i32) -> String {
    match code {
        109 | 111 => "Token expired".to_string(),
        110 => "Invalid token".to_string(),
        other => format!("Error {other}"),
    }
}
