//! Pseudo-provider for workflows that skip discovery, such as restoring an
//! archived group. It publishes one manually built group, once.

use std::sync::Arc;

use node_model::{GroupSource, ResolvedGroup, ResolvedService, ServiceRecord};
use tracing::info;

use crate::error::{DiscoveryError, Result};
use crate::manager::ResolvedGroupManager;
use crate::provider::DiscoveryProvider;

pub struct ArchiveProvider {
    uid: Option<String>,
    record: ServiceRecord,
    published: bool,
    running: bool,
}

impl ArchiveProvider {
    pub fn new(record: ServiceRecord) -> Self {
        Self {
            uid: None,
            record,
            published: false,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for ArchiveProvider {
    fn source(&self) -> GroupSource {
        GroupSource::Archive
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    async fn start_discovery(&mut self, manager: Arc<ResolvedGroupManager>) -> Result<()> {
        let uid = self.uid.clone().ok_or(DiscoveryError::MissingUid)?;
        self.running = true;
        if self.published {
            return Ok(());
        }

        let mut record = self.record.clone();
        record.provider_id = uid.clone();
        let group =
            ResolvedGroup::new(Arc::new(ResolvedService::new(record)), GroupSource::Archive)?;
        info!("archive: restoring group {} ({})", group.name(), group.uid());
        manager.set_list(&uid, vec![group]).await;
        self.published = true;
        Ok(())
    }

    async fn stop_discovery(&mut self) {
        self.running = false;
    }
}
