//! Gossip protocol for the Crosstalk presence channel.
//!
//! This crate defines the four message kinds peers exchange over the
//! presence channel to keep call-identity state convergent across
//! disconnects and missed messages, plus their field-stable JSON
//! encoding. There is no authoritative roster anywhere: every peer
//! rebuilds its view from these messages alone.

#![warn(clippy::pedantic)]

pub mod message;

pub use message::{decode, encode, GossipMessage, ProtocolError};
