//! Capability interface every discovery backend implements.
//!
//! A provider is handed a unique id by its registrant before first use. Once
//! started it resolves services on its own background task and publishes its
//! whole current list with `ResolvedGroupManager::set_list(uid, ..)`.

use std::sync::Arc;

use node_model::GroupSource;

use crate::error::Result;
use crate::manager::ResolvedGroupManager;

#[async_trait::async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Backend family, used to tag the groups it produces.
    fn source(&self) -> GroupSource;

    /// Assign the provider id. Must happen before `start_discovery`.
    fn set_uid(&mut self, uid: String);

    fn uid(&self) -> Option<&str>;

    /// Begin resolving services. Errors mean nothing was started.
    async fn start_discovery(&mut self, manager: Arc<ResolvedGroupManager>) -> Result<()>;

    /// Stop resolving. Safe to call when not running.
    async fn stop_discovery(&mut self);
}
