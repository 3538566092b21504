//! Signaling-server discovery for nodes that are not on the same LAN.
//!
//! Polls `GET {base}/groups?app_id=<app>` on an interval. The server answers
//! with a JSON array of adverts; each poll replaces the provider's list. A
//! failed poll keeps the last published list.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use node_model::{GroupDescriptor, GroupSource, ServiceRecord};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DiscoveryError, Result};
use crate::group_index::GroupIndex;
use crate::manager::ResolvedGroupManager;
use crate::provider::DiscoveryProvider;

/// One advertiser as listed by the signaling server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingAdvert {
    pub service_name: String,
    pub host: IpAddr,
    pub discovery_port: u16,
    #[serde(default)]
    pub engine_port: u16,
    pub app_id: String,
    pub group_name: String,
    pub group_uid: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl SignalingAdvert {
    pub fn into_record(self, provider_id: &str) -> ServiceRecord {
        let group = GroupDescriptor::new(self.group_name, self.group_uid);
        let mut record = ServiceRecord::new(
            provider_id,
            self.service_name,
            self.host,
            self.discovery_port,
            &group,
        );
        record.engine_port = self.engine_port;
        record.app_id = self.app_id;
        record.attributes = self.attributes;
        record
    }
}

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub base_url: String,
    pub app_id: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl SignalingConfig {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct SignalingProvider {
    uid: Option<String>,
    config: SignalingConfig,
    session: Option<(CancellationToken, JoinHandle<()>)>,
}

impl SignalingProvider {
    pub fn new(config: SignalingConfig) -> Self {
        Self {
            uid: None,
            config,
            session: None,
        }
    }

    fn groups_url(&self) -> Result<Url> {
        let invalid = |reason: String| DiscoveryError::InvalidEndpoint {
            url: self.config.base_url.clone(),
            reason,
        };
        let base = Url::parse(&self.config.base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base.scheme())));
        }
        let mut url = base
            .join("groups")
            .map_err(|e| invalid(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("app_id", &self.config.app_id);
        Ok(url)
    }
}

/// Fetch one listing from the signaling server.
pub async fn fetch_adverts(client: &Client, url: Url) -> Result<Vec<SignalingAdvert>> {
    let adverts = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<SignalingAdvert>>()
        .await?;
    Ok(adverts)
}

/// Coalesce a listing into groups, skipping adverts of other applications.
pub fn index_adverts(provider_id: &str, app_id: &str, adverts: Vec<SignalingAdvert>) -> GroupIndex {
    let mut index = GroupIndex::new(GroupSource::Signaling);
    for advert in adverts {
        if advert.app_id != app_id {
            continue;
        }
        index.upsert(advert.into_record(provider_id));
    }
    index
}

#[async_trait::async_trait]
impl DiscoveryProvider for SignalingProvider {
    fn source(&self) -> GroupSource {
        GroupSource::Signaling
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
        let url = self.groups_url()?;
        let client = Client::builder()
            .timeout(self.config.request_timeout)
            .build()?;
        let app_id = self.config.app_id.clone();
        let interval = self.config.poll_interval;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let polled = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    polled = fetch_adverts(&client, url.clone()) => polled,
                };
                match polled {
                    Ok(adverts) => {
                        let index = index_adverts(&uid, &app_id, adverts);
                        debug!("signaling: {} groups listed", index.len());
                        manager.set_list(&uid, index.groups()).await;
                    }
                    Err(e) => debug!("signaling: poll failed: {e}"),
                }
            }
        });

        info!("signaling: polling {}", self.config.base_url);
        self.session = Some((cancel, task));
        Ok(())
    }

    async fn stop_discovery(&mut self) {
        if let Some((cancel, task)) = self.session.take() {
            cancel.cancel();
            task.await.ok();
            info!("signaling: discovery stopped");
        }
    }
}
