//! HTTP peer discovery client.
//!
//! Fetches the genesis or current roster of a group from a member's
//! discovery endpoint, either awaited directly or on a spawned task that
//! reports to a [`PeersListener`].

pub mod client;
pub mod config;
pub mod error;

pub use client::{peers_url, HttpPeerClient, PeerFetcher, PeerRequest, PeersListener};
pub use config::ClientConfig;
pub use error::PeersError;
