//! reqwest client for the peer discovery endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use node_model::{Peer, Roster};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::PeersError;

/// Receives the outcome of a [`HttpPeerClient::request_peers`] call.
/// Exactly one of the two methods is called per request, unless the
/// request was cancelled first.
pub trait PeersListener: Send + Sync {
    fn on_receive_peers(&self, peers: Vec<Peer>);
    fn on_failure(&self, error: PeersError);
}

/// Anything that can fetch a roster from a discovery endpoint.
#[async_trait::async_trait]
pub trait PeerFetcher: Send + Sync {
    async fn fetch_peers(
        &self,
        target: SocketAddr,
        roster: Roster,
    ) -> Result<Vec<Peer>, PeersError>;
}

pub fn peers_url(target: SocketAddr, roster: Roster) -> String {
    format!("http://{target}{}", roster.path())
}

#[derive(Clone)]
pub struct HttpPeerClient {
    client: Client,
    config: ClientConfig,
}

impl HttpPeerClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn fetch_peers(
        &self,
        target: SocketAddr,
        roster: Roster,
    ) -> Result<Vec<Peer>, PeersError> {
        self.fetch_url(&peers_url(target, roster)).await
    }

    /// Fetch a roster from a full URL, for targets known by host name.
    ///
    /// Bounded by the connect deadline and the read deadline, which restarts
    /// after every successful read.
    pub async fn fetch_url(&self, url: &str) -> Result<Vec<Peer>, PeersError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            debug!("peer request to {url} failed: {e}");
            PeersError::from_transport(&e)
        })?;
        if !resp.status().is_success() {
            debug!("peer request to {url} returned {}", resp.status());
            return Err(PeersError::Unknown);
        }
        let body = resp.bytes().await.map_err(|e| {
            debug!("reading peer list from {url} failed: {e}");
            PeersError::from_transport(&e)
        })?;
        serde_json::from_slice::<Vec<Peer>>(&body).map_err(|e| {
            debug!("peer list from {url} rejected: {e}");
            PeersError::InvalidJson
        })
    }

    /// Run the request on its own task and report to `listener`.
    pub fn request_peers(
        &self,
        target: SocketAddr,
        roster: Roster,
        listener: Arc<dyn PeersListener>,
    ) -> PeerRequest {
        let request = PeerRequest::new();
        let client = self.clone();
        let state = request.state.clone();
        let cancel = request.cancel.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = client.fetch_peers(target, roster) => outcome,
            };
            if state
                .compare_exchange(PENDING, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            match outcome {
                Ok(peers) => listener.on_receive_peers(peers),
                Err(error) => listener.on_failure(error),
            }
        });

        request
    }
}

#[async_trait::async_trait]
impl PeerFetcher for HttpPeerClient {
    async fn fetch_peers(
        &self,
        target: SocketAddr,
        roster: Roster,
    ) -> Result<Vec<Peer>, PeersError> {
        HttpPeerClient::fetch_peers(self, target, roster).await
    }
}

const PENDING: u8 = 0;
const DELIVERED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to an in-flight [`HttpPeerClient::request_peers`] call.
#[derive(Clone)]
pub struct PeerRequest {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl PeerRequest {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the request. Idempotent and safe after completion.
    ///
    /// Returns true if this call suppressed delivery; the listener will
    /// not be called for this request. Returns false if the outcome was
    /// already handed to the listener or the request was cancelled before.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel();
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}
