//! Direct peer-link discovery (Wi-Fi Direct style radio links).
//!
//! Link establishment lives in platform code; it reports link events on a
//! channel. A link session exposes at most one advertised service: while one
//! is active, further connections are ignored until the link is lost.

use std::sync::Arc;

use node_model::{GroupSource, ResolvedGroup, ResolvedService, ServiceRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, Result};
use crate::manager::ResolvedGroupManager;
use crate::provider::DiscoveryProvider;

#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A peer link came up and its service was resolved.
    Connected(ServiceRecord),
    /// The current link went away.
    Lost,
}

pub struct DirectLinkProvider {
    uid: Option<String>,
    events: Option<mpsc::Receiver<LinkEvent>>,
    session: Option<(CancellationToken, JoinHandle<()>)>,
}

impl DirectLinkProvider {
    pub fn new(events: mpsc::Receiver<LinkEvent>) -> Self {
        Self {
            uid: None,
            events: Some(events),
            session: None,
        }
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for DirectLinkProvider {
    fn source(&self) -> GroupSource {
        GroupSource::DirectLink
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    async fn start_discovery(&mut self, manager: Arc<ResolvedGroupManager>) -> Result<()> {
        let uid = self.uid.clone().ok_or(DiscoveryError::MissingUid)?;
        if self.session.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }
        let mut events = self.events.take().ok_or(DiscoveryError::SessionExhausted)?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut active: Option<String> = None;
            loop {
                let event = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Some(LinkEvent::Connected(record)) => {
                        if let Some(current) = &active {
                            debug!(
                                "direct link: ignoring {}, session holds {current}",
                                record.service_name
                            );
                            continue;
                        }
                        let mut record = record;
                        record.provider_id = uid.clone();
                        let name = record.service_name.clone();
                        let service = Arc::new(ResolvedService::new(record));
                        match ResolvedGroup::new(service, GroupSource::DirectLink) {
                            Ok(group) => {
                                info!("direct link: resolved group {} via {name}", group.uid());
                                active = Some(name);
                                manager.set_list(&uid, vec![group]).await;
                            }
                            Err(e) => warn!("direct link: could not resolve {name}: {e}"),
                        }
                    }
                    Some(LinkEvent::Lost) => {
                        if active.take().is_some() {
                            info!("direct link: link lost");
                            manager.set_list(&uid, Vec::new()).await;
                        }
                    }
                    None => {
                        debug!("direct link: event channel closed");
                        break;
                    }
                }
            }
        });

        self.session = Some((cancel, task));
        Ok(())
    }

    async fn stop_discovery(&mut self) {
        if let Some((cancel, task)) = self.session.take() {
            cancel.cancel();
            task.await.ok();
        }
    }
}
