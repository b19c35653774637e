//! `ChannelActor` - single writer for identity state and gossip.
//!
//! The actor owns the [`IdentityRoster`] and is the only code that mutates
//! it. It ingests the presence channel's event feed through a bounded
//! drop-oldest queue, handles caller commands through a mailbox, and
//! publishes its two projections (`ChannelConnectionState`, `ChannelState`)
//! through `watch` channels.
//!
//! # Gossip protocol
//!
//! - After every successful (re)subscription the actor broadcasts a
//!   `StateRequest`.
//! - Every inbound `StateRequest` is answered with a `StateAnnounce` after
//!   a randomized jitter delay, but only while the local peer holds a
//!   transport binding. The jitter avoids a response storm when many peers
//!   reconnect together.
//! - A `Disconnected -> Connected` link transition while bound re-issues
//!   the `StateRequest`, repairing state lost during the outage.

use std::sync::Arc;
use std::time::Duration;

use call_protocol::GossipMessage;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::errors::EngineError;
use crate::events::{EventQueue, EventSender};
use crate::metrics::EngineMetrics;
use crate::timefmt::now_millis;

use super::client::{ChannelEvent, ChannelLinkState, PresenceChannel};
use super::roster::IdentityRoster;
use super::{ChannelConnectionState, ChannelState};

/// Mailbox buffer for caller commands.
const CHANNEL_COMMAND_BUFFER: usize = 64;

/// Messages sent to the `ChannelActor`.
pub enum ChannelCommand {
    /// Run the login/subscribe/state-request sequence.
    Connect {
        respond_to: oneshot::Sender<Result<(), EngineError>>,
    },

    /// Tear down the channel session and reset all identity state.
    Disconnect { respond_to: oneshot::Sender<()> },

    /// Broadcast a gossip message. Local `Joined`/`Left` are also applied
    /// to the roster directly, since the channel does not echo a peer's
    /// own publishes back to it.
    Publish { message: GossipMessage },

    /// Transport-layer offline signal for a remote transport id.
    RemoteOffline { transport_id: u32 },

    /// Internal: the spawned connect sequence finished.
    ConnectFinished {
        result: Result<(), EngineError>,
        respond_to: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// Handle to the `ChannelActor`.
#[derive(Clone)]
pub struct ChannelHandle {
    sender: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// Connect the presence channel (login, subscribe, request state).
    ///
    /// Re-entrant calls while a connect is in flight, or while the channel
    /// is already non-idle, return `Ok(())` without doing anything.
    ///
    /// # Errors
    ///
    /// Login/subscribe rejections, or `Internal` if the actor is gone.
    pub async fn connect(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ChannelCommand::Connect { respond_to: tx })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| EngineError::Internal(format!("response receive failed: {e}")))?
    }

    /// Disconnect and reset all identity state.
    ///
    /// # Errors
    ///
    /// `Internal` if the actor is gone.
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ChannelCommand::Disconnect { respond_to: tx })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| EngineError::Internal(format!("response receive failed: {e}")))
    }

    /// Broadcast a gossip message (fire-and-forget).
    ///
    /// # Errors
    ///
    /// `Internal` if the actor is gone.
    pub async fn publish(&self, message: GossipMessage) -> Result<(), EngineError> {
        self.sender
            .send(ChannelCommand::Publish { message })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))
    }

    /// Report a remote transport going offline.
    ///
    /// # Errors
    ///
    /// `Internal` if the actor is gone.
    pub async fn remote_offline(&self, transport_id: u32) -> Result<(), EngineError> {
        self.sender
            .send(ChannelCommand::RemoteOffline { transport_id })
            .await
            .map_err(|e| EngineError::Internal(format!("channel send failed: {e}")))
    }
}

/// The `ChannelActor` implementation.
pub struct ChannelActor {
    config: Arc<Config>,
    local_user_id: String,
    client: Arc<dyn PresenceChannel>,
    receiver: mpsc::Receiver<ChannelCommand>,
    /// Sender for internal follow-ups (connect completion).
    self_sender: mpsc::Sender<ChannelCommand>,
    events: EventQueue<ChannelEvent>,
    /// Feedback path for publish failures observed by spawned tasks.
    feedback: EventSender<ChannelEvent>,
    roster: IdentityRoster,
    /// Connect re-entry guard.
    connecting: bool,
    cancel_token: CancellationToken,
    conn_tx: watch::Sender<ChannelConnectionState>,
    state_tx: watch::Sender<ChannelState>,
    metrics: Arc<EngineMetrics>,
}

impl ChannelActor {
    /// Spawn the actor. Returns a handle and the task join handle.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: Arc<Config>,
        local_user_id: String,
        client: Arc<dyn PresenceChannel>,
        events: EventQueue<ChannelEvent>,
        feedback: EventSender<ChannelEvent>,
        conn_tx: watch::Sender<ChannelConnectionState>,
        state_tx: watch::Sender<ChannelState>,
        metrics: Arc<EngineMetrics>,
        cancel_token: CancellationToken,
    ) -> (ChannelHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_COMMAND_BUFFER);

        let roster = IdentityRoster::new(local_user_id.clone(), config.max_users);
        let actor = Self {
            config,
            local_user_id,
            client,
            receiver,
            self_sender: sender.clone(),
            events,
            feedback,
            roster,
            connecting: false,
            cancel_token,
            conn_tx,
            state_tx,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        (ChannelHandle { sender }, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "engine.channel", fields(user_id = %self.local_user_id))]
    async fn run(mut self) {
        info!(target: "engine.channel", "ChannelActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "engine.channel", "ChannelActor cancelled");
                    break;
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "engine.channel", "command channel closed, exiting");
                            break;
                        }
                    }
                }

                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            self.metrics.record_channel_event();
                            self.handle_event(event);
                        }
                        None => {
                            debug!(target: "engine.channel", "event feed closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "engine.channel",
            users = self.roster.state().user_count(),
            "ChannelActor stopped"
        );
    }

    async fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Connect { respond_to } => self.handle_connect(respond_to),
            ChannelCommand::Disconnect { respond_to } => {
                self.handle_disconnect().await;
                let _ = respond_to.send(());
            }
            ChannelCommand::Publish { message } => self.handle_publish(message),
            ChannelCommand::RemoteOffline { transport_id } => {
                if self.roster.apply_remote_offline(transport_id) {
                    self.publish_state();
                } else {
                    debug!(
                        target: "engine.channel",
                        transport_id,
                        "transport offline for unknown id, ignoring"
                    );
                }
            }
            ChannelCommand::ConnectFinished { result, respond_to } => {
                self.connecting = false;
                if let Err(err) = &result {
                    warn!(target: "engine.channel", error = %err, "channel connect failed");
                    self.conn_tx
                        .send_replace(ChannelConnectionState::Failed(err.to_string()));
                }
                let _ = respond_to.send(result);
            }
        }
    }

    /// Start the connect sequence unless one is already in flight or the
    /// channel is already past `Idle`.
    fn handle_connect(&mut self, respond_to: oneshot::Sender<Result<(), EngineError>>) {
        if self.connecting || *self.conn_tx.borrow() != ChannelConnectionState::Idle {
            debug!(target: "engine.channel", "connect ignored: already connecting or connected");
            let _ = respond_to.send(Ok(()));
            return;
        }

        self.connecting = true;
        self.conn_tx.send_replace(ChannelConnectionState::Connecting);

        let client = Arc::clone(&self.client);
        let config = Arc::clone(&self.config);
        let requester_id = self.local_user_id.clone();
        let self_sender = self.self_sender.clone();
        let feedback = self.feedback.clone();
        let metrics = Arc::clone(&self.metrics);

        // Login/subscribe run outside the actor loop so inbound events
        // keep flowing; the outcome comes back as ConnectFinished.
        tokio::spawn(async move {
            let result =
                run_connect_sequence(client.as_ref(), &config, &requester_id, &feedback, &metrics)
                    .await;
            let _ = self_sender
                .send(ChannelCommand::ConnectFinished { result, respond_to })
                .await;
        });
    }

    async fn handle_disconnect(&mut self) {
        self.connecting = false;

        // Unsubscribe before logout so no messages arrive mid-teardown
        if let Err(err) = self.client.unsubscribe(&self.config.channel_name).await {
            debug!(target: "engine.channel", error = %err, "unsubscribe failed during disconnect");
        }
        if let Err(err) = self.client.logout().await {
            debug!(target: "engine.channel", error = %err, "logout failed during disconnect");
        }

        self.roster.reset();
        self.publish_state();
        self.conn_tx.send_replace(ChannelConnectionState::Idle);

        info!(target: "engine.channel", "channel disconnected, state reset");
    }

    fn handle_publish(&mut self, message: GossipMessage) {
        match &message {
            GossipMessage::Joined {
                user_id,
                display_name,
                transport_id,
                timestamp,
            } => {
                self.roster
                    .apply_joined(user_id, display_name, *transport_id, *timestamp);
                self.publish_state();
            }
            GossipMessage::Left {
                user_id,
                transport_id,
                ..
            } => {
                self.roster.apply_left(user_id, *transport_id);
                self.publish_state();
            }
            _ => {}
        }
        self.spawn_publish(message);
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::LinkState(link) => self.handle_link_state(link),
            ChannelEvent::Message(payload) => self.handle_message(&payload),
            ChannelEvent::Presence { publisher_id } => {
                // Identity comes only from gossip payloads
                debug!(target: "engine.channel", publisher_id = %publisher_id, "presence event ignored");
            }
            ChannelEvent::PublishFailed(reason) => {
                warn!(target: "engine.channel", reason = %reason, "gossip publish failed");
                self.metrics.record_publish_failure();
            }
        }
    }

    fn handle_link_state(&mut self, link: ChannelLinkState) {
        let previous = self.conn_tx.borrow().clone();
        let next = match link {
            ChannelLinkState::Idle => ChannelConnectionState::Idle,
            ChannelLinkState::Connecting => ChannelConnectionState::Connecting,
            ChannelLinkState::Connected => ChannelConnectionState::Connected,
            ChannelLinkState::Reconnecting => ChannelConnectionState::Reconnecting,
            ChannelLinkState::Disconnected => ChannelConnectionState::Disconnected,
            ChannelLinkState::Failed(reason) => ChannelConnectionState::Failed(reason),
        };
        self.conn_tx.send_replace(next.clone());

        // A reconnect may have lost us messages (and peers may have lost
        // ours); re-synchronize if we are actually in a call.
        if previous == ChannelConnectionState::Disconnected
            && next == ChannelConnectionState::Connected
            && self.roster.is_bound()
        {
            debug!(target: "engine.channel", "link recovered, re-requesting state");
            self.spawn_publish(GossipMessage::StateRequest {
                requester_id: self.local_user_id.clone(),
                timestamp: now_millis(),
            });
        }
    }

    fn handle_message(&mut self, payload: &str) {
        let message = match call_protocol::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                self.metrics.record_malformed_payload();
                debug!(target: "engine.channel", error = %err, "dropping unreadable payload");
                return;
            }
        };

        match message {
            GossipMessage::Joined {
                user_id,
                display_name,
                transport_id,
                timestamp,
            } => {
                self.roster
                    .apply_joined(&user_id, &display_name, transport_id, timestamp);
                self.publish_state();
            }
            GossipMessage::Left {
                user_id,
                transport_id,
                ..
            } => {
                self.roster.apply_left(&user_id, transport_id);
                self.publish_state();
            }
            GossipMessage::StateAnnounce {
                user_id,
                display_name,
                transport_id,
                session_start_time,
                ..
            } => {
                self.roster.apply_state_announce(
                    &user_id,
                    &display_name,
                    transport_id,
                    session_start_time,
                );
                self.publish_state();
            }
            GossipMessage::StateRequest { requester_id, .. } => {
                self.answer_state_request(&requester_id);
            }
        }
    }

    /// Answer a peer's state request with our own announce, after jitter.
    ///
    /// Peers without a transport binding stay silent: they have nothing to
    /// announce and would only add noise to the response round.
    fn answer_state_request(&self, requester_id: &str) {
        let Some(binding) = self.roster.local() else {
            debug!(
                target: "engine.channel",
                requester_id,
                "ignoring state request: no transport binding"
            );
            return;
        };

        let message = GossipMessage::StateAnnounce {
            user_id: self.local_user_id.clone(),
            display_name: binding.display_name.clone(),
            transport_id: binding.transport_id,
            session_start_time: self
                .roster
                .state()
                .session_start_time
                .or(Some(binding.joined_at)),
            timestamp: now_millis(),
        };

        let (min, max) = self.config.announce_jitter;
        let jitter_ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
        let jitter = Duration::from_millis(u64::try_from(jitter_ms).unwrap_or(u64::MAX));

        let client = Arc::clone(&self.client);
        let config = Arc::clone(&self.config);
        let feedback = self.feedback.clone();
        let metrics = Arc::clone(&self.metrics);
        let token = self.cancel_token.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(jitter) => {
                    publish_message(client.as_ref(), &config, &message, &feedback, &metrics).await;
                }
            }
        });
    }

    /// Fire-and-forget a gossip publish on a spawned task.
    fn spawn_publish(&self, message: GossipMessage) {
        let client = Arc::clone(&self.client);
        let config = Arc::clone(&self.config);
        let feedback = self.feedback.clone();
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            publish_message(client.as_ref(), &config, &message, &feedback, &metrics).await;
        });
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.roster.state().clone());
    }
}

/// Login, subscribe, let the subscription settle, then ask peers for
/// their state.
async fn run_connect_sequence(
    client: &dyn PresenceChannel,
    config: &Config,
    requester_id: &str,
    feedback: &EventSender<ChannelEvent>,
    metrics: &EngineMetrics,
) -> Result<(), EngineError> {
    client
        .login(&config.presence_token)
        .await
        .map_err(|e| EngineError::ChannelLogin(e.to_string()))?;

    client
        .subscribe(&config.channel_name, true)
        .await
        .map_err(|e| EngineError::ChannelSubscribe(e.to_string()))?;

    tokio::time::sleep(config.state_request_delay).await;

    publish_message(
        client,
        config,
        &GossipMessage::StateRequest {
            requester_id: requester_id.to_string(),
            timestamp: now_millis(),
        },
        feedback,
        metrics,
    )
    .await;

    Ok(())
}

/// Encode and publish one gossip message; failures come back through the
/// event feed rather than the caller.
async fn publish_message(
    client: &dyn PresenceChannel,
    config: &Config,
    message: &GossipMessage,
    feedback: &EventSender<ChannelEvent>,
    metrics: &EngineMetrics,
) {
    let payload = match call_protocol::encode(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(target: "engine.channel", error = %err, "failed to encode gossip message");
            return;
        }
    };

    metrics.record_published();
    if let Err(err) = client.publish(&config.channel_name, &payload).await {
        feedback.send(ChannelEvent::PublishFailed(err.to_string()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory presence channel capturing everything published.
    #[derive(Default)]
    struct FakeChannel {
        published: Mutex<Vec<String>>,
        fail_login: bool,
    }

    impl FakeChannel {
        fn published(&self) -> Vec<GossipMessage> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|p| call_protocol::decode(p).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl PresenceChannel for FakeChannel {
        async fn login(&self, _token: &SecretString) -> Result<(), ClientError> {
            if self.fail_login {
                return Err(ClientError("login rejected".to_string()));
            }
            Ok(())
        }

        async fn subscribe(&self, _channel: &str, _with_messages: bool) -> Result<(), ClientError> {
            Ok(())
        }

        async fn publish(&self, _channel: &str, payload: &str) -> Result<(), ClientError> {
            self.published.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, _channel: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn logout(&self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct Harness {
        handle: ChannelHandle,
        events: EventSender<ChannelEvent>,
        conn_rx: watch::Receiver<ChannelConnectionState>,
        state_rx: watch::Receiver<ChannelState>,
        client: Arc<FakeChannel>,
        metrics: Arc<EngineMetrics>,
        cancel: CancellationToken,
    }

    fn config() -> Config {
        let vars = HashMap::from([(
            "CALL_PRESENCE_TOKEN".to_string(),
            "test-token".to_string(),
        )]);
        Config::from_vars(&vars).unwrap()
    }

    fn spawn_actor(client: Arc<FakeChannel>) -> Harness {
        let config = Arc::new(config());
        let (events_tx, events_rx) = crate::events::queue(config.event_queue_capacity);
        let (conn_tx, conn_rx) = watch::channel(ChannelConnectionState::Idle);
        let (state_tx, state_rx) = watch::channel(ChannelState::new(config.max_users));
        let metrics = EngineMetrics::new();
        let cancel = CancellationToken::new();

        let (handle, _task) = ChannelActor::spawn(
            config,
            "local".to_string(),
            Arc::clone(&client) as Arc<dyn PresenceChannel>,
            events_rx,
            events_tx.clone(),
            conn_tx,
            state_tx,
            Arc::clone(&metrics),
            cancel.clone(),
        );

        Harness {
            handle,
            events: events_tx,
            conn_rx,
            state_rx,
            client,
            metrics,
            cancel,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_publishes_state_request() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.handle.connect().await.unwrap();

        let published = h.client.published();
        assert_eq!(published.len(), 1);
        assert!(matches!(
            &published[0],
            GossipMessage::StateRequest { requester_id, .. } if requester_id == "local"
        ));
        assert_eq!(*h.conn_rx.borrow(), ChannelConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_terminal() {
        let h = spawn_actor(Arc::new(FakeChannel {
            fail_login: true,
            ..FakeChannel::default()
        }));

        let result = h.handle.connect().await;
        assert!(matches!(result, Err(EngineError::ChannelLogin(_))));
        assert!(matches!(
            &*h.conn_rx.borrow(),
            ChannelConnectionState::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reentry_is_ignored() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.handle.connect().await.unwrap();
        h.handle.connect().await.unwrap();

        // Only the first connect ran the sequence
        assert_eq!(h.client.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_gossip_updates_state() {
        let mut h = spawn_actor(Arc::new(FakeChannel::default()));

        let joined = call_protocol::encode(&GossipMessage::Joined {
            user_id: "u1".to_string(),
            display_name: "Alice".to_string(),
            transport_id: 7,
            timestamp: 1000,
        })
        .unwrap();
        h.events.send(ChannelEvent::Message(joined));
        settle().await;

        {
            let state = h.state_rx.borrow_and_update();
            assert_eq!(state.user_count(), 1);
            assert_eq!(state.session_start_time, Some(1000));
        }

        let left = call_protocol::encode(&GossipMessage::Left {
            user_id: "u1".to_string(),
            transport_id: Some(7),
            timestamp: 2000,
        })
        .unwrap();
        h.events.send(ChannelEvent::Message(left));
        settle().await;

        let state = h.state_rx.borrow_and_update();
        assert_eq!(state.user_count(), 0);
        assert_eq!(state.session_start_time, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_payloads_are_dropped() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.events
            .send(ChannelEvent::Message("{broken".to_string()));
        h.events.send(ChannelEvent::Message(
            r#"{"type":"CHAT","timestamp":1}"#.to_string(),
        ));
        settle().await;

        assert_eq!(h.metrics.snapshot().malformed_payloads, 2);
        assert_eq!(h.state_rx.borrow().user_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_request_answered_after_jitter_when_bound() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        // Bind the local peer via its own echoed join
        h.handle
            .publish(GossipMessage::Joined {
                user_id: "local".to_string(),
                display_name: "Me".to_string(),
                transport_id: 7,
                timestamp: 1000,
            })
            .await
            .unwrap();
        settle().await;
        assert_eq!(h.client.published().len(), 1); // the join itself

        let request = call_protocol::encode(&GossipMessage::StateRequest {
            requester_id: "peer".to_string(),
            timestamp: 2000,
        })
        .unwrap();
        h.events.send(ChannelEvent::Message(request));
        settle().await;

        // No announce before the jitter window elapses
        assert_eq!(h.client.published().len(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        settle().await;

        let published = h.client.published();
        assert_eq!(published.len(), 2);
        assert!(matches!(
            &published[1],
            GossipMessage::StateAnnounce { user_id, transport_id: 7, session_start_time: Some(1000), .. }
                if user_id == "local"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_request_ignored_when_not_bound() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        let request = call_protocol::encode(&GossipMessage::StateRequest {
            requester_id: "peer".to_string(),
            timestamp: 2000,
        })
        .unwrap();
        h.events.send(ChannelEvent::Message(request));
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;

        assert!(h.client.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_reissues_state_request_when_bound() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.handle
            .publish(GossipMessage::Joined {
                user_id: "local".to_string(),
                display_name: "Me".to_string(),
                transport_id: 7,
                timestamp: 1000,
            })
            .await
            .unwrap();
        settle().await;

        h.events
            .send(ChannelEvent::LinkState(ChannelLinkState::Disconnected));
        h.events
            .send(ChannelEvent::LinkState(ChannelLinkState::Connected));
        settle().await;

        let published = h.client.published();
        assert!(matches!(
            published.last(),
            Some(GossipMessage::StateRequest { requester_id, .. }) if requester_id == "local"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_offline_without_mapping_is_noop() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.handle.remote_offline(42).await.unwrap();
        settle().await;

        assert_eq!(h.state_rx.borrow().user_count(), 0);
        assert!(h.client.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resets_state() {
        let mut h = spawn_actor(Arc::new(FakeChannel::default()));

        h.handle.connect().await.unwrap();
        h.events
            .send(ChannelEvent::LinkState(ChannelLinkState::Connected));
        h.handle
            .publish(GossipMessage::Joined {
                user_id: "local".to_string(),
                display_name: "Me".to_string(),
                transport_id: 7,
                timestamp: 1000,
            })
            .await
            .unwrap();
        settle().await;
        assert_eq!(h.state_rx.borrow_and_update().user_count(), 1);

        h.handle.disconnect().await.unwrap();
        settle().await;

        assert_eq!(*h.conn_rx.borrow(), ChannelConnectionState::Idle);
        assert_eq!(h.state_rx.borrow().user_count(), 0);
        assert_eq!(h.state_rx.borrow().session_start_time, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_actor() {
        let h = spawn_actor(Arc::new(FakeChannel::default()));

        h.cancel.cancel();
        settle().await;

        // Actor mailbox is gone; commands now fail as Internal
        let result = h.handle.remote_offline(1).await;
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }
}
