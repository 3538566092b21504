//! Node wiring: configuration, host and join sequences.

pub mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mdns_sd::ServiceDaemon;
use node_api::{PeerDiscoveryServer, RosterSource};
use node_join::{load_archive, ConfigDirWriter, JoinCoordinator, JoinHandoff, JoinReady, JoinState};
use node_mesh::{
    register_group_service, unregister_group_service, ArchiveProvider, DiscoveryRegistry,
    GroupAdvertisement, MdnsProvider, ResolvedGroupManager, SignalingConfig, SignalingProvider,
};
use node_model::{GroupDescriptor, Peer, ResolvedGroup};
use node_peer_client::HttpPeerClient;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NodeConfig;

/// Wait until the manager lists a group, or the group with `uid` if given.
pub async fn wait_for_group(
    manager: &ResolvedGroupManager,
    uid: Option<&str>,
    timeout: Duration,
) -> Result<Arc<ResolvedGroup>> {
    let changed = Arc::new(Notify::new());
    let notify = changed.clone();
    manager
        .register_update_listener(Arc::new(move || notify.notify_one()))
        .await;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = match uid {
            Some(uid) => manager.find_group(uid).await,
            None => manager.groups().await.into_iter().next(),
        };
        if let Some(group) = found.filter(|g| !g.is_empty()) {
            return Ok(group);
        }
        if tokio::time::timeout_at(deadline, changed.notified()).await.is_err() {
            match uid {
                Some(uid) => bail!("group {uid} not discovered within {timeout:?}"),
                None => bail!("no group discovered within {timeout:?}"),
            }
        }
    }
}

/// A running host: serves its rosters and, optionally, advertises on mDNS.
pub struct HostNode {
    pub group: GroupDescriptor,
    pub addr: SocketAddr,
    pub roster: Arc<RosterSource>,
    shutdown: CancellationToken,
    server: JoinHandle<Result<()>>,
    advert: Option<(ServiceDaemon, String)>,
}

impl HostNode {
    pub async fn stop(self) -> Result<()> {
        if let Some((daemon, fullname)) = self.advert {
            unregister_group_service(&daemon, &fullname);
            daemon.shutdown().ok();
        }
        self.shutdown.cancel();
        self.server.await.context("peer discovery server task")?
    }
}

/// Found a group with ourselves as the only member.
pub async fn start_host(config: &NodeConfig) -> Result<HostNode> {
    let group = GroupDescriptor::new(
        config.group_name.clone(),
        config
            .group_uid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );
    let pub_key = config
        .public_key_hex
        .clone()
        .unwrap_or_else(|| format!("0x{}", uuid::Uuid::new_v4().simple()));

    let server = PeerDiscoveryServer::bind(&config.listen_host, config.discovery_port).await?;
    let addr = server.local_addr()?;
    let founder = Peer::new(
        pub_key,
        format!("{}:{}", advertised_host(config, addr), config.engine_port),
        config.moniker.clone(),
    );
    let roster = Arc::new(RosterSource::founding(&[founder]));

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server.serve(roster.clone(), shutdown.clone()));

    let advert = if config.enable_mdns {
        let daemon = ServiceDaemon::new().context("start mDNS daemon")?;
        let ad = GroupAdvertisement {
            instance_name: format!("{}-{}", config.moniker, addr.port()),
            app_id: config.app_id.clone(),
            group: group.clone(),
            discovery_port: addr.port(),
            engine_port: config.engine_port,
        };
        match register_group_service(&daemon, &ad) {
            Ok(fullname) => Some((daemon, fullname)),
            Err(e) => {
                warn!("mDNS advertisement failed, continuing without it: {e:#}");
                daemon.shutdown().ok();
                None
            }
        }
    } else {
        None
    };

    info!("hosting group {} ({}) on {addr}", group.name, group.uid);
    Ok(HostNode {
        group,
        addr,
        roster,
        shutdown,
        server,
        advert,
    })
}

fn advertised_host(config: &NodeConfig, addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| config.listen_host.clone())
    } else {
        addr.ip().to_string()
    }
}

/// Discover a group, join it and write the engine's configuration directory.
/// Returns the directory written.
pub async fn run_join(config: &NodeConfig) -> Result<PathBuf> {
    let manager = Arc::new(ResolvedGroupManager::new());
    let mut registry = DiscoveryRegistry::new(manager.clone());

    if let Some(dir) = &config.restore_archive {
        let archived = load_archive(dir).with_context(|| format!("restore {}", dir.display()))?;
        registry.register(Box::new(ArchiveProvider::new(archived.to_record())));
    }
    if config.enable_mdns {
        registry.register(Box::new(MdnsProvider::new(config.app_id.clone())));
    }
    if let Some(url) = &config.signaling_url {
        let mut signaling = SignalingConfig::new(url.clone(), config.app_id.clone());
        signaling.poll_interval = Duration::from_secs(config.signaling_interval_secs.max(1));
        registry.register(Box::new(SignalingProvider::new(signaling)));
    }
    if registry.ids().is_empty() {
        bail!("no discovery provider configured");
    }

    let report = registry.start_all().await;
    for (id, reason) in &report.failed {
        warn!("discovery provider {id} unavailable: {reason}");
    }
    if report.started.is_empty() {
        bail!("no discovery provider could be started");
    }

    let timeout = Duration::from_secs(config.discovery_timeout_secs);
    let found = wait_for_group(&manager, config.join_group_uid.as_deref(), timeout).await;
    registry.stop_all().await;
    let group = found?;
    info!("found group {} ({}) via {}", group.name(), group.uid(), group.source());

    let restored = group
        .services()
        .iter()
        .find_map(|s| JoinReady::from_service(s, config.moniker.clone()));
    let ready = match restored {
        Some(ready) => {
            info!("using archived rosters for {}", ready.group.uid);
            ready
        }
        None => join_group(config, &group).await?,
    };

    let dir = config.data_dir.join(&ready.group.uid);
    ConfigDirWriter::new(&dir)
        .hand_off(&ready)
        .context("hand off to consensus engine")?;
    Ok(dir)
}

async fn join_group(config: &NodeConfig, group: &ResolvedGroup) -> Result<JoinReady> {
    let client = HttpPeerClient::new(config.peer_client).context("build peer client")?;
    let coordinator = JoinCoordinator::new(Arc::new(client));
    let selector = config.selection.selector();
    coordinator.start(group, selector.as_ref(), config.moniker.clone())?;

    match coordinator.settled().await {
        JoinState::Ready(ready) => Ok(ready),
        JoinState::Failed(failure) => bail!(
            "joining {} failed fetching {} peers: {}",
            group.uid(),
            failure.stage,
            failure.error
        ),
        other => bail!("join ended in unexpected state {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_model::{GroupSource, ResolvedService, ServiceRecord};

    fn group(uid: &str) -> Arc<ResolvedGroup> {
        let descriptor = GroupDescriptor::new("g", uid);
        let record =
            ServiceRecord::new("p", "svc", "127.0.0.1".parse().unwrap(), 8000, &descriptor);
        ResolvedGroup::new(Arc::new(ResolvedService::new(record)), GroupSource::Signaling).unwrap()
    }

    #[tokio::test]
    async fn wait_returns_known_group_at_once() {
        let manager = ResolvedGroupManager::new();
        manager.set_list("p", vec![group("a")]).await;
        let found = wait_for_group(&manager, None, Duration::from_millis(10)).await.unwrap();
        assert_eq!(found.uid(), "a");
    }

    #[tokio::test]
    async fn wait_follows_updates() {
        let manager = Arc::new(ResolvedGroupManager::new());
        let publisher = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.set_list("p", vec![group("other")]).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.set_list("p", vec![group("other"), group("wanted")]).await;
        });

        let found = wait_for_group(&manager, Some("wanted"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(found.uid(), "wanted");
    }

    #[tokio::test]
    async fn wait_times_out() {
        let manager = ResolvedGroupManager::new();
        manager.set_list("p", vec![group("a")]).await;
        let err = wait_for_group(&manager, Some("b"), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("group b"));
    }

    #[tokio::test]
    async fn join_without_providers_is_refused() {
        let config = NodeConfig {
            enable_mdns: false,
            ..NodeConfig::default()
        };
        let err = run_join(&config).await.unwrap_err();
        assert!(err.to_string().contains("no discovery provider"));
    }
}
