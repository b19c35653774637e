//! Shared in-memory collaborators for engine integration tests.
//!
//! `BusChannel` is a presence channel that delivers every published
//! payload straight into linked peers' event queues, with an `offline`
//! switch to simulate lost messages. `NullTransport` accepts every
//! command; transport events are injected by tests directly.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use call_engine::channel::{ChannelEvent, ChannelLinkState, PresenceChannel};
use call_engine::config::Config;
use call_engine::errors::ClientError;
use call_engine::events::EventSender;
use call_engine::transport::{MediaTransport, TransportEvent};
use call_engine::CallEngine;
use call_protocol::GossipMessage;
use secrecy::SecretString;

/// Presence channel delivering publishes to linked peers in-memory.
#[derive(Default)]
pub struct BusChannel {
    log: Mutex<Vec<String>>,
    peers: Mutex<Vec<EventSender<ChannelEvent>>>,
    /// While set, this peer's publishes are lost in transit.
    offline: AtomicBool,
}

impl BusChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver this peer's future publishes to the given event feed.
    pub fn link(&self, peer: EventSender<ChannelEvent>) {
        self.peers.lock().unwrap().push(peer);
    }

    /// Simulate an outage: publishes are accepted but never delivered.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Everything this peer attempted to publish, decoded.
    pub fn published(&self) -> Vec<GossipMessage> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|p| call_protocol::decode(p).unwrap())
            .collect()
    }
}

#[async_trait]
impl PresenceChannel for BusChannel {
    async fn login(&self, _token: &SecretString) -> Result<(), ClientError> {
        Ok(())
    }

    async fn subscribe(&self, _channel: &str, _with_messages: bool) -> Result<(), ClientError> {
        Ok(())
    }

    async fn publish(&self, _channel: &str, payload: &str) -> Result<(), ClientError> {
        self.log.lock().unwrap().push(payload.to_string());
        if !self.offline.load(Ordering::SeqCst) {
            for peer in self.peers.lock().unwrap().iter() {
                peer.send(ChannelEvent::Message(payload.to_string()));
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, _channel: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Media transport that accepts every command.
#[derive(Default)]
pub struct NullTransport {
    pub left: AtomicBool,
}

#[async_trait]
impl MediaTransport for NullTransport {
    async fn join(
        &self,
        _token: Option<&SecretString>,
        _channel: &str,
        _local_transport_id: u32,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn leave(&self) -> Result<(), ClientError> {
        self.left.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn mute_local_audio(&self, _muted: bool) -> Result<(), ClientError> {
        Ok(())
    }

    async fn enable_local_video(&self, _enabled: bool) -> Result<(), ClientError> {
        Ok(())
    }

    async fn switch_camera(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// One engine with its fakes and event feeds.
pub struct TestPeer {
    pub engine: CallEngine,
    pub presence: Arc<BusChannel>,
    pub transport: Arc<NullTransport>,
    pub channel_events: EventSender<ChannelEvent>,
    pub transport_events: EventSender<TransportEvent>,
}

pub fn test_config() -> Config {
    let vars = HashMap::from([(
        "CALL_PRESENCE_TOKEN".to_string(),
        "test-token".to_string(),
    )]);
    Config::from_vars(&vars).unwrap()
}

pub fn spawn_peer() -> TestPeer {
    init_tracing();
    let presence = BusChannel::new();
    let transport = Arc::new(NullTransport::default());
    let engine = CallEngine::new(
        test_config(),
        Arc::clone(&presence) as Arc<dyn PresenceChannel>,
        Arc::clone(&transport) as Arc<dyn MediaTransport>,
    );
    let channel_events = engine.channel_events();
    let transport_events = engine.transport_events();
    TestPeer {
        engine,
        presence,
        transport,
        channel_events,
        transport_events,
    }
}

/// Wire two peers' presence channels to each other.
pub fn link_peers(a: &TestPeer, b: &TestPeer) {
    a.presence.link(b.channel_events.clone());
    b.presence.link(a.channel_events.clone());
}

/// Connect the presence channel and report the link as up.
pub async fn bring_online(peer: &TestPeer) {
    peer.engine.connect_channel().await.unwrap();
    peer.channel_events
        .send(ChannelEvent::LinkState(ChannelLinkState::Connected));
    settle().await;
}

/// Let the actors drain their queues without advancing time.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_engine=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
