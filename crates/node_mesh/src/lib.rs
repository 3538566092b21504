//! Group discovery: provider interface, per-provider backends, and the
//! manager that merges their results into one list.
//!
//! Backends: mDNS on the LAN, direct peer links, a signaling server, and an
//! archive pseudo-provider for restores.

pub mod archive;
pub mod direct_link;
pub mod discovery;
pub mod error;
pub mod group_index;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod signaling;

pub use archive::ArchiveProvider;
pub use direct_link::{DirectLinkProvider, LinkEvent};
pub use discovery::{
    register_group_service, unregister_group_service, GroupAdvertisement, MdnsProvider,
};
pub use error::DiscoveryError;
pub use group_index::GroupIndex;
pub use manager::{ResolvedGroupManager, UpdateListener};
pub use provider::DiscoveryProvider;
pub use registry::{DiscoveryRegistry, StartReport};
pub use signaling::{SignalingAdvert, SignalingConfig, SignalingProvider};
