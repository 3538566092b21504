//! Join state machine.
//!
//! ```text
//! Idle -> AwaitingGenesisPeers -> AwaitingCurrentPeers -> Ready
//!              |                        |
//!              +--------> Failed <------+
//! ```
//!
//! `cancel()` returns either awaiting state to Idle; `reset()` returns Ready
//! or Failed to Idle. One fetch is in flight at a time. Every flight carries
//! an epoch, and results from a superseded epoch are dropped.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use node_model::{GroupDescriptor, Peer, ResolvedGroup, ResolvedService, Roster};
use node_peer_client::{PeerFetcher, PeersError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::JoinError;
use crate::selector::ServiceSelector;

/// Everything the consensus engine needs to start as a group member.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinReady {
    pub group: GroupDescriptor,
    pub moniker: String,
    pub target: SocketAddr,
    pub genesis_peers: Vec<Peer>,
    pub current_peers: Vec<Peer>,
}

impl JoinReady {
    /// Build a handoff straight from a service that already carries both
    /// rosters, as restored archives do.
    pub fn from_service(service: &ResolvedService, moniker: impl Into<String>) -> Option<Self> {
        Some(Self {
            group: service.group(),
            moniker: moniker.into(),
            target: service.discovery_addr(),
            genesis_peers: service.genesis_peers()?.to_vec(),
            current_peers: service.current_peers()?.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinFailure {
    /// The roster whose fetch failed.
    pub stage: Roster,
    pub error: PeersError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum JoinState {
    #[default]
    Idle,
    AwaitingGenesisPeers,
    AwaitingCurrentPeers,
    Ready(JoinReady),
    Failed(JoinFailure),
}

impl JoinState {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitingGenesisPeers | Self::AwaitingCurrentPeers)
    }
}

struct Flight {
    epoch: u64,
    cancel: Option<CancellationToken>,
}

#[derive(Clone)]
struct Shared {
    flight: Arc<Mutex<Flight>>,
    state: Arc<watch::Sender<JoinState>>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a state reached by flight `epoch`. Returns false if the
    /// flight was superseded, in which case nothing changes.
    fn advance(&self, epoch: u64, next: JoinState) -> bool {
        let mut flight = self.lock();
        if flight.epoch != epoch {
            debug!("join: dropping result of superseded attempt {epoch}");
            return false;
        }
        if !next.is_awaiting() {
            flight.cancel = None;
        }
        self.state.send_replace(next);
        true
    }
}

pub struct JoinCoordinator {
    fetcher: Arc<dyn PeerFetcher>,
    shared: Shared,
}

impl JoinCoordinator {
    pub fn new(fetcher: Arc<dyn PeerFetcher>) -> Self {
        let (state, _) = watch::channel(JoinState::Idle);
        Self {
            fetcher,
            shared: Shared {
                flight: Arc::new(Mutex::new(Flight {
                    epoch: 0,
                    cancel: None,
                })),
                state: Arc::new(state),
            },
        }
    }

    pub fn state(&self) -> JoinState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JoinState> {
        self.shared.state.subscribe()
    }

    /// Wait until no fetch is in flight and return the state reached.
    pub async fn settled(&self) -> JoinState {
        self.subscribe()
            .wait_for(|s| !s.is_awaiting())
            .await
            .map(|state| state.clone())
            .unwrap_or_else(|_| self.state())
    }

    /// Begin joining `group` through the service picked by `selector`.
    pub fn start(
        &self,
        group: &ResolvedGroup,
        selector: &dyn ServiceSelector,
        moniker: impl Into<String>,
    ) -> Result<(), JoinError> {
        let mut flight = self.shared.lock();
        if *self.shared.state.borrow() != JoinState::Idle {
            return Err(JoinError::Busy);
        }
        let service = selector
            .select(&group.services())
            .ok_or(JoinError::NoService)?;

        flight.epoch += 1;
        let epoch = flight.epoch;
        let cancel = CancellationToken::new();
        flight.cancel = Some(cancel.clone());
        self.shared.state.send_replace(JoinState::AwaitingGenesisPeers);
        drop(flight);

        let target = service.discovery_addr();
        info!(
            "join: joining {} ({}) via {} at {target}",
            group.name(),
            group.uid(),
            service.service_name()
        );

        let attempt = Attempt {
            epoch,
            target,
            group: group.descriptor().clone(),
            moniker: moniker.into(),
            fetcher: self.fetcher.clone(),
            shared: self.shared.clone(),
        };
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => debug!("join: attempt {epoch} cancelled"),
                _ = attempt.run() => {}
            }
        });
        Ok(())
    }

    /// Abandon an in-flight join. Returns false if nothing was in flight.
    pub fn cancel(&self) -> bool {
        let mut flight = self.shared.lock();
        if !self.shared.state.borrow().is_awaiting() {
            return false;
        }
        flight.epoch += 1;
        if let Some(token) = flight.cancel.take() {
            token.cancel();
        }
        self.shared.state.send_replace(JoinState::Idle);
        info!("join: cancelled");
        true
    }

    /// Return a finished join (Ready or Failed) to Idle.
    pub fn reset(&self) -> bool {
        let _flight = self.shared.lock();
        let finished = matches!(
            *self.shared.state.borrow(),
            JoinState::Ready(_) | JoinState::Failed(_)
        );
        if finished {
            self.shared.state.send_replace(JoinState::Idle);
        }
        finished
    }
}

impl Drop for JoinCoordinator {
    fn drop(&mut self) {
        if let Some(token) = self.shared.lock().cancel.take() {
            token.cancel();
        }
    }
}

struct Attempt {
    epoch: u64,
    target: SocketAddr,
    group: GroupDescriptor,
    moniker: String,
    fetcher: Arc<dyn PeerFetcher>,
    shared: Shared,
}

impl Attempt {
    async fn run(self) {
        let genesis_peers = match self.fetcher.fetch_peers(self.target, Roster::Genesis).await {
            Ok(peers) => peers,
            Err(error) => return self.fail(Roster::Genesis, error),
        };
        debug!("join: {} genesis peers from {}", genesis_peers.len(), self.target);
        if !self.shared.advance(self.epoch, JoinState::AwaitingCurrentPeers) {
            return;
        }

        let current_peers = match self.fetcher.fetch_peers(self.target, Roster::Current).await {
            Ok(peers) => peers,
            Err(error) => return self.fail(Roster::Current, error),
        };
        debug!("join: {} current peers from {}", current_peers.len(), self.target);

        let ready = JoinReady {
            group: self.group.clone(),
            moniker: self.moniker.clone(),
            target: self.target,
            genesis_peers,
            current_peers,
        };
        if self.shared.advance(self.epoch, JoinState::Ready(ready)) {
            info!("join: ready to join {}", self.group.uid);
        }
    }

    fn fail(&self, stage: Roster, error: PeersError) {
        if self
            .shared
            .advance(self.epoch, JoinState::Failed(JoinFailure { stage, error }))
        {
            warn!("join: {stage} peers from {} failed: {error}", self.target);
        }
    }
}
