//! HTTP peer discovery server.
//!
//! Endpoints:
//! - GET /peers         current roster
//! - GET /genesispeers  genesis roster
//!
//! Bodies are pulled from a [`PeersSource`] on every request and returned
//! verbatim as `application/json`.

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use node_model::{Peer, CURRENT_PEERS_PATH, GENESIS_PEERS_PATH};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supplies the JSON-encoded rosters served by the discovery endpoints.
pub trait PeersSource: Send + Sync {
    fn genesis_peers(&self) -> String;
    fn current_peers(&self) -> String;
}

pub fn build_router(source: Arc<dyn PeersSource>) -> Router {
    Router::new()
        .route(CURRENT_PEERS_PATH, get(handle_current))
        .route(GENESIS_PEERS_PATH, get(handle_genesis))
        .with_state(source)
}

async fn handle_current(State(source): State<Arc<dyn PeersSource>>) -> impl IntoResponse {
    debug!("serving current peers");
    ([(header::CONTENT_TYPE, "application/json")], source.current_peers())
}

async fn handle_genesis(State(source): State<Arc<dyn PeersSource>>) -> impl IntoResponse {
    debug!("serving genesis peers");
    ([(header::CONTENT_TYPE, "application/json")], source.genesis_peers())
}

/// A bound, not yet serving, discovery server.
pub struct PeerDiscoveryServer {
    listener: TcpListener,
}

impl PeerDiscoveryServer {
    /// Bind `host:port`. Port 0 picks a free port, see [`Self::local_addr`].
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("bind peer discovery server on {host}:{port}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("peer discovery server address")
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(
        self,
        source: Arc<dyn PeersSource>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("peer discovery server listening on {addr}");
        }
        axum::serve(self.listener, build_router(source))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("serve peer discovery")?;
        info!("peer discovery server stopped");
        Ok(())
    }
}

/// In-memory rosters: a fixed genesis list and a replaceable current list.
pub struct RosterSource {
    genesis: String,
    current: RwLock<String>,
}

fn encode(peers: &[Peer]) -> String {
    serde_json::to_string(peers).unwrap_or_else(|e| {
        warn!("could not encode roster: {e}");
        "[]".to_string()
    })
}

impl RosterSource {
    pub fn new(genesis: &[Peer], current: &[Peer]) -> Self {
        Self {
            genesis: encode(genesis),
            current: RwLock::new(encode(current)),
        }
    }

    /// A freshly created group: genesis and current rosters are the same.
    pub fn founding(peers: &[Peer]) -> Self {
        Self::new(peers, peers)
    }

    pub fn set_current(&self, peers: &[Peer]) {
        let encoded = encode(peers);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = encoded;
    }
}

impl PeersSource for RosterSource {
    fn genesis_peers(&self) -> String {
        self.genesis.clone()
    }

    fn current_peers(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
