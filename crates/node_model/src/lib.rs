//! Shared data model: peers, group descriptors, resolved services and groups.
//!
//! Plain records with no I/O. Every other crate in the workspace builds on
//! these types.

pub mod error;
pub mod group;
pub mod peer;
pub mod roster;
pub mod service;

pub use error::{ModelError, Result};
pub use group::{GroupDescriptor, GroupSource, ResolvedGroup};
pub use peer::Peer;
pub use roster::{Roster, CURRENT_PEERS_PATH, GENESIS_PEERS_PATH};
pub use service::{ResolvedService, ServiceRecord};
