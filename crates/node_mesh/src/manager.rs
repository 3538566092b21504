//! Resolved group manager: one sub-list per discovery provider, one combined list.
//!
//! Every mutation runs inside a single FIFO-fair lock: replace the provider's
//! sub-list, rebuild the combined list from scratch, then call the update
//! listener. The listener runs inside the lock and must not block; handing
//! the change off to another context is its own job.

use std::sync::Arc;

use node_model::ResolvedGroup;
use tokio::sync::Mutex;
use tracing::debug;

/// Called after every rebuild of the combined list.
pub type UpdateListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ManagerState {
    /// Sub-lists in provider first-registration order.
    lists: Vec<(String, Vec<Arc<ResolvedGroup>>)>,
    combined: Vec<Arc<ResolvedGroup>>,
    listener: Option<UpdateListener>,
}

impl ManagerState {
    fn rebuild(&mut self) {
        let total = self.lists.iter().map(|(_, groups)| groups.len()).sum();
        let mut combined = Vec::with_capacity(total);
        for (_, groups) in &self.lists {
            combined.extend(groups.iter().cloned());
        }
        self.combined = combined;

        if let Some(listener) = &self.listener {
            listener();
        }
    }
}

#[derive(Default)]
pub struct ResolvedGroupManager {
    state: Mutex<ManagerState>,
}

impl ResolvedGroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a provider's sub-list wholesale and republish.
    pub async fn set_list(&self, provider_id: &str, groups: Vec<Arc<ResolvedGroup>>) {
        let mut state = self.state.lock().await;
        let count = groups.len();
        match state.lists.iter_mut().find(|(id, _)| id == provider_id) {
            Some((_, list)) => *list = groups,
            None => state.lists.push((provider_id.to_string(), groups)),
        }
        state.rebuild();
        debug!(
            provider = provider_id,
            groups = count,
            total = state.combined.len(),
            "resolved group list updated"
        );
    }

    /// Drop a provider's sub-list. Nothing is republished if it had none.
    pub async fn remove_list(&self, provider_id: &str) {
        let mut state = self.state.lock().await;
        let before = state.lists.len();
        state.lists.retain(|(id, _)| id != provider_id);
        if state.lists.len() == before {
            return;
        }
        state.rebuild();
        debug!(
            provider = provider_id,
            total = state.combined.len(),
            "resolved group list removed"
        );
    }

    /// Install the update listener, replacing any previous one.
    pub async fn register_update_listener(&self, listener: UpdateListener) {
        self.state.lock().await.listener = Some(listener);
    }

    /// Snapshot of the combined list.
    pub async fn groups(&self) -> Vec<Arc<ResolvedGroup>> {
        self.state.lock().await.combined.clone()
    }

    /// First group in the combined list with the given uid.
    pub async fn find_group(&self, uid: &str) -> Option<Arc<ResolvedGroup>> {
        self.state
            .lock()
            .await
            .combined
            .iter()
            .find(|g| g.uid() == uid)
            .cloned()
    }

    /// Number of providers currently holding a sub-list.
    pub async fn provider_count(&self) -> usize {
        self.state.lock().await.lists.len()
    }
}
