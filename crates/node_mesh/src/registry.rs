//! Registrant for discovery providers.
//!
//! Hands each provider a unique id, starts and stops them, and clears a
//! provider's sub-list from the manager when it fails to start or stops.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{DiscoveryError, Result};
use crate::manager::ResolvedGroupManager;
use crate::provider::DiscoveryProvider;

/// Outcome of starting every registered provider.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, DiscoveryError)>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Entry {
    id: String,
    provider: Box<dyn DiscoveryProvider>,
    running: bool,
}

pub struct DiscoveryRegistry {
    manager: Arc<ResolvedGroupManager>,
    entries: Vec<Entry>,
}

impl DiscoveryRegistry {
    pub fn new(manager: Arc<ResolvedGroupManager>) -> Self {
        Self {
            manager,
            entries: Vec::new(),
        }
    }

    pub fn manager(&self) -> &Arc<ResolvedGroupManager> {
        &self.manager
    }

    /// Take ownership of a provider and give it a fresh id.
    pub fn register(&mut self, mut provider: Box<dyn DiscoveryProvider>) -> String {
        let id = format!("{}-{}", provider.source(), uuid::Uuid::new_v4().simple());
        provider.set_uid(id.clone());
        self.entries.push(Entry {
            id: id.clone(),
            provider,
            running: false,
        });
        id
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id && e.running)
    }

    /// Start one provider. Returns false if it is unknown or failed to start.
    pub async fn start(&mut self, id: &str) -> bool {
        self.try_start(id).await.is_ok()
    }

    /// Start one provider, keeping the reason it could not start.
    pub async fn try_start(&mut self, id: &str) -> Result<()> {
        let manager = self.manager.clone();
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| DiscoveryError::UnknownProvider(id.to_string()))?;
        if entry.running {
            return Ok(());
        }
        match entry.provider.start_discovery(manager.clone()).await {
            Ok(()) => {
                entry.running = true;
                info!("discovery provider {id} started");
                Ok(())
            }
            Err(e) => {
                warn!("discovery provider {id} failed to start: {e}");
                manager.remove_list(id).await;
                Err(e)
            }
        }
    }

    pub async fn start_all(&mut self) -> StartReport {
        let mut report = StartReport::default();
        for id in self.ids() {
            match self.try_start(&id).await {
                Ok(()) => report.started.push(id),
                Err(e) => report.failed.push((id, e)),
            }
        }
        report
    }

    /// Stop one provider and drop its sub-list.
    pub async fn stop(&mut self, id: &str) {
        let manager = self.manager.clone();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.provider.stop_discovery().await;
            entry.running = false;
            manager.remove_list(id).await;
        }
    }

    pub async fn stop_all(&mut self) {
        for id in self.ids() {
            self.stop(&id).await;
        }
    }
}
