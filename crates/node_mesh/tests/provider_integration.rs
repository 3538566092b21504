//! Integration test: several providers feeding one manager.
//!
//! A signaling server stub on localhost, a direct link fed by hand and an
//! archive pseudo-provider all publish into the same ResolvedGroupManager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use node_mesh::signaling::SignalingAdvert;
use node_mesh::{
    ArchiveProvider, DirectLinkProvider, DiscoveryRegistry, LinkEvent, ResolvedGroupManager,
    SignalingConfig, SignalingProvider,
};
use node_model::{GroupDescriptor, GroupSource, ServiceRecord};
use tokio::sync::mpsc;

fn advert(name: &str, uid: &str) -> SignalingAdvert {
    SignalingAdvert {
        service_name: name.into(),
        host: "127.0.0.1".parse().unwrap(),
        discovery_port: 8000,
        engine_port: 1337,
        app_id: "meshjoin".into(),
        group_name: format!("group {uid}"),
        group_uid: uid.into(),
        attributes: Default::default(),
    }
}

async fn spawn_signaling(listing: Arc<Mutex<Vec<SignalingAdvert>>>) -> String {
    let app = Router::new().route(
        "/groups",
        get(move |Query(q): Query<std::collections::HashMap<String, String>>| {
            let listing = listing.clone();
            async move {
                assert_eq!(q.get("app_id").map(String::as_str), Some("meshjoin"));
                Json(listing.lock().unwrap().clone())
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://127.0.0.1:{port}/")
}

async fn wait_for(manager: &ResolvedGroupManager, count: usize) {
    for _ in 0..100 {
        if manager.groups().await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {count} groups, have {}",
        manager.groups().await.len()
    );
}

#[tokio::test]
async fn signaling_poll_publishes_and_replaces() {
    let listing = Arc::new(Mutex::new(vec![advert("n1", "g1"), advert("n2", "g1")]));
    let base = spawn_signaling(listing.clone()).await;

    let manager = Arc::new(ResolvedGroupManager::new());
    let mut config = SignalingConfig::new(base, "meshjoin");
    config.poll_interval = Duration::from_millis(50);
    let mut registry = DiscoveryRegistry::new(manager.clone());
    registry.register(Box::new(SignalingProvider::new(config)));
    assert!(registry.start_all().await.all_started());

    wait_for(&manager, 1).await;
    let groups = manager.groups().await;
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[0].source(), GroupSource::Signaling);

    *listing.lock().unwrap() = vec![advert("n1", "g1"), advert("n3", "g2")];
    wait_for(&manager, 2).await;

    registry.stop_all().await;
    assert!(manager.groups().await.is_empty());
}

#[tokio::test]
async fn mixed_providers_share_one_list() {
    let manager = Arc::new(ResolvedGroupManager::new());
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    manager
        .register_update_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    let mut registry = DiscoveryRegistry::new(manager.clone());

    let archived = GroupDescriptor::new("archived", "g-archive");
    registry.register(Box::new(ArchiveProvider::new(ServiceRecord::new(
        "",
        "archive",
        "127.0.0.1".parse().unwrap(),
        8000,
        &archived,
    ))));

    let (link_tx, link_rx) = mpsc::channel(4);
    let link_id = registry.register(Box::new(DirectLinkProvider::new(link_rx)));

    let report = registry.start_all().await;
    assert_eq!(report.started.len(), 2);

    let linked = GroupDescriptor::new("linked", "g-link");
    link_tx
        .send(LinkEvent::Connected(ServiceRecord::new(
            "",
            "peer-radio",
            "192.168.49.1".parse().unwrap(),
            8000,
            &linked,
        )))
        .await
        .unwrap();

    wait_for(&manager, 2).await;
    let uids: Vec<_> = manager
        .groups()
        .await
        .iter()
        .map(|g| g.uid().to_string())
        .collect();
    assert_eq!(uids, ["g-archive", "g-link"]);

    registry.stop(&link_id).await;
    wait_for(&manager, 1).await;
    assert!(updates.load(Ordering::SeqCst) >= 3);

    registry.stop_all().await;
}

#[tokio::test]
async fn unreachable_signaling_keeps_running() {
    let manager = Arc::new(ResolvedGroupManager::new());
    let mut config = SignalingConfig::new("http://127.0.0.1:1/", "meshjoin");
    config.poll_interval = Duration::from_millis(20);
    config.request_timeout = Duration::from_millis(200);

    let mut registry = DiscoveryRegistry::new(manager.clone());
    let id = registry.register(Box::new(SignalingProvider::new(config)));
    assert!(registry.start(&id).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.is_running(&id));
    assert!(manager.groups().await.is_empty());
    registry.stop_all().await;
}
