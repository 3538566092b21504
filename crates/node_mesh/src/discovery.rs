//! mDNS-based LAN discovery using mdns-sd.
//!
//! A hosting node registers `_meshjoin._tcp.local.` with its group in the TXT
//! record and its HTTP peer discovery port as the service port. The provider
//! browses for that type and publishes every resolved advertiser, coalesced
//! by group uid.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use node_model::{GroupDescriptor, GroupSource, ServiceRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::group_index::GroupIndex;
use crate::manager::ResolvedGroupManager;
use crate::provider::DiscoveryProvider;

pub const SERVICE_TYPE: &str = "_meshjoin._tcp.local.";
pub const TXT_APP_ID: &str = "app_id";
pub const TXT_GROUP_NAME: &str = "group_name";
pub const TXT_GROUP_UID: &str = "group_uid";
pub const TXT_ENGINE_PORT: &str = "engine_port";

const BROWSE_POLL: Duration = Duration::from_millis(250);

/// What a hosting node puts on the LAN.
#[derive(Debug, Clone)]
pub struct GroupAdvertisement {
    pub instance_name: String,
    pub app_id: String,
    pub group: GroupDescriptor,
    pub discovery_port: u16,
    pub engine_port: u16,
}

/// Register a hosted group on mDNS. Returns the full service name.
pub fn register_group_service(daemon: &ServiceDaemon, ad: &GroupAdvertisement) -> Result<String> {
    let host = local_hostname();

    let properties = [
        (TXT_APP_ID.to_string(), ad.app_id.clone()),
        (TXT_GROUP_NAME.to_string(), ad.group.name.clone()),
        (TXT_GROUP_UID.to_string(), ad.group.uid.clone()),
        (TXT_ENGINE_PORT.to_string(), ad.engine_port.to_string()),
    ];

    let service = ServiceInfo::new(
        SERVICE_TYPE,
        &ad.instance_name,
        &format!("{host}.local."),
        "",
        ad.discovery_port,
        &properties[..],
    )
    .context("create mDNS service info")?
    .enable_addr_auto();

    let fullname = service.get_fullname().to_string();
    daemon.register(service).context("register mDNS service")?;

    info!(
        "mDNS: advertising group {} ({}) on port {}",
        ad.group.name, ad.group.uid, ad.discovery_port
    );
    Ok(fullname)
}

/// Withdraw a hosted group from mDNS.
pub fn unregister_group_service(daemon: &ServiceDaemon, fullname: &str) {
    if let Err(e) = daemon.unregister(fullname) {
        warn!("mDNS: failed to unregister {fullname}: {e}");
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "meshjoin-node".into())
}

/// Map one resolved mDNS announcement onto a service record.
///
/// Returns `None` when the group TXT keys are missing.
pub fn record_from_txt(
    provider_id: &str,
    fullname: &str,
    hostname: &str,
    addr: IpAddr,
    port: u16,
    properties: HashMap<String, String>,
) -> Option<ServiceRecord> {
    let group_uid = properties.get(TXT_GROUP_UID).filter(|v| !v.is_empty())?;
    let group_name = properties.get(TXT_GROUP_NAME)?;
    let group = GroupDescriptor::new(group_name.as_str(), group_uid.as_str());

    let mut record = ServiceRecord::new(provider_id, fullname, addr, port, &group);
    record.app_id = properties.get(TXT_APP_ID).cloned().unwrap_or_default();
    record.engine_port = properties
        .get(TXT_ENGINE_PORT)
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();
    let display = hostname.trim_end_matches('.');
    if !display.is_empty() {
        record.addr_display = Some(display.to_string());
    }
    record.attributes = properties;
    Some(record)
}

fn record_from_info(provider_id: &str, info: &ServiceInfo) -> Option<ServiceRecord> {
    let addresses = info.get_addresses();
    let addr = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    let properties = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_string(), p.val_str().to_string()))
        .collect();

    record_from_txt(
        provider_id,
        info.get_fullname(),
        info.get_hostname(),
        addr,
        info.get_port(),
        properties,
    )
}

struct Session {
    daemon: ServiceDaemon,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Browses the LAN for advertised groups of one application.
pub struct MdnsProvider {
    uid: Option<String>,
    app_id: String,
    session: Option<Session>,
}

impl MdnsProvider {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            uid: None,
            app_id: app_id.into(),
            session: None,
        }
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for MdnsProvider {
    fn source(&self) -> GroupSource {
        GroupSource::Mdns
    }

    fn set_uid(&mut self, uid: String) {
        self.uid = Some(uid);
    }

    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    async fn start_discovery(
        &mut self,
        manager: Arc<ResolvedGroupManager>,
    ) -> crate::error::Result<()> {
        let uid = self.uid.clone().ok_or(DiscoveryError::MissingUid)?;
        if self.session.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }

        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(SERVICE_TYPE)?;
        let cancel = CancellationToken::new();

        // mdns-sd hands out a blocking receiver; bridge it onto the runtime.
        let (tx, mut rx) = mpsc::channel::<ServiceEvent>(64);
        let bridge_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            while !bridge_cancel.is_cancelled() {
                match receiver.recv_timeout(BROWSE_POLL) {
                    Ok(event) => {
                        if tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(_) if receiver.is_disconnected() => break,
                    Err(_) => {}
                }
            }
        });

        let app_id = self.app_id.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut index = GroupIndex::new(GroupSource::Mdns);
            loop {
                let event = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                let Some(event) = event else {
                    debug!("mDNS browse channel closed");
                    break;
                };
                if handle_event(&mut index, &uid, &app_id, event) {
                    manager.set_list(&uid, index.groups()).await;
                }
            }
        });

        info!("mDNS: browsing for {SERVICE_TYPE}");
        self.session = Some(Session {
            daemon,
            cancel,
            task,
        });
        Ok(())
    }

    async fn stop_discovery(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.cancel.cancel();
        if let Err(e) = session.daemon.stop_browse(SERVICE_TYPE) {
            debug!("mDNS: stop_browse failed: {e}");
        }
        if let Err(e) = session.daemon.shutdown() {
            debug!("mDNS: daemon shutdown failed: {e}");
        }
        session.task.await.ok();
        info!("mDNS: discovery stopped");
    }
}

/// Apply one browse event. Returns true if the provider's list changed.
fn handle_event(index: &mut GroupIndex, uid: &str, app_id: &str, event: ServiceEvent) -> bool {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let Some(record) = record_from_info(uid, &info) else {
                debug!("mDNS: ignoring {} without group TXT", info.get_fullname());
                return false;
            };
            if record.app_id != app_id {
                debug!("mDNS: ignoring {} from app {}", info.get_fullname(), record.app_id);
                return false;
            }
            let group_uid = record.group_uid.clone();
            if index.upsert(record) {
                info!("mDNS: discovered group {group_uid} via {}", info.get_fullname());
            } else {
                debug!("mDNS: refreshed {} for group {group_uid}", info.get_fullname());
            }
            true
        }
        ServiceEvent::ServiceRemoved(_type, fullname) => {
            let removed = index.remove(&fullname);
            if removed {
                debug!("mDNS: service removed: {fullname}");
            }
            removed
        }
        ServiceEvent::SearchStarted(_) => {
            debug!("mDNS: browse started");
            false
        }
        _ => false,
    }
}
