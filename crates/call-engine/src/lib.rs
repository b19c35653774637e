//! Crosstalk Call Engine
//!
//! This library reconciles two independent real-time subsystems into one
//! consistent participant view:
//!
//! - the **presence channel** (who is in the session, under what display
//!   name, since when), driven by a best-effort gossip protocol, and
//! - the **media transport session** (actual audio/video streams, keyed by
//!   numeric transport ids assigned at join time).
//!
//! Neither subsystem knows about the other's identifiers or failure modes.
//! The engine ingests both event feeds, maintains two independent state
//! projections, and merges them into a unified participant list, repairing
//! divergence caused by message loss, reconnects and out-of-order delivery.
//!
//! # Architecture
//!
//! Each channel's state is owned by a single actor with a bounded,
//! drop-oldest event queue, so all mutation is single-writer:
//!
//! ```text
//! CallEngine
//! ├── ChannelActor (identity state machine + gossip protocol handler)
//! │     ingests ChannelEvent, owns IdentityRoster, publishes ChannelState
//! ├── TransportActor (transport state machine + reconnection supervisor)
//! │     ingests TransportEvent, owns TransportRoster, publishes snapshots
//! └── projector task (pure merge on every change of either side)
//!       publishes Vec<Participant>, local participant first
//! ```
//!
//! # Key invariants
//!
//! - **Identity is authoritative**: a participant is surfaced iff both an
//!   identity binding and a live transport entry exist for the same
//!   transport id. Transport-only "ghosts" are never rendered.
//! - **Single writer per channel**: events are funneled through one ordered
//!   queue per channel; overflow drops the oldest buffered event, favoring
//!   liveness of the live state over completeness of a backlog.
//! - **Convergence is eventual**: there is no authoritative roster; state
//!   lost to disconnects is repaired by the request/announce gossip round.
//!
//! # Modules
//!
//! - [`engine`] - the [`CallEngine`](engine::CallEngine) façade
//! - [`channel`] - presence side: identity roster, gossip, orchestration
//! - [`transport`] - media side: transport roster, reconnect supervision
//! - [`projection`] - the pure identity/transport merge
//! - [`events`] - bounded drop-oldest event queues
//! - [`config`] - environment configuration
//! - [`errors`] - engine error types

pub mod channel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod projection;
pub mod timefmt;
pub mod transport;

pub use engine::CallEngine;
pub use errors::EngineError;
