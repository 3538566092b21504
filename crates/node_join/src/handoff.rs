//! Handing a finished join to the consensus engine.
//!
//! The engine consumes a configuration directory:
//!
//! - `peers.genesis.json`  genesis roster, peer wire format
//! - `peers.json`          current roster, peer wire format
//! - `group.toml`          group name and uid, our moniker, the address joined through
//!
//! [`load_archive`] reads such a directory back so a group can be restored
//! without running discovery.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use node_model::{GroupDescriptor, Peer, ServiceRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::JoinReady;
use crate::error::HandoffError;

pub const GENESIS_PEERS_FILE: &str = "peers.genesis.json";
pub const CURRENT_PEERS_FILE: &str = "peers.json";
pub const GROUP_FILE: &str = "group.toml";

/// Receives a completed join.
pub trait JoinHandoff: Send + Sync {
    fn hand_off(&self, ready: &JoinReady) -> Result<(), HandoffError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupFile {
    name: String,
    uid: String,
    moniker: String,
    discovery_addr: String,
}

/// Writes the engine's configuration directory.
pub struct ConfigDirWriter {
    dir: PathBuf,
}

impl ConfigDirWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), HandoffError> {
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|e| HandoffError::io(path, e))
    }
}

impl JoinHandoff for ConfigDirWriter {
    fn hand_off(&self, ready: &JoinReady) -> Result<(), HandoffError> {
        fs::create_dir_all(&self.dir).map_err(|e| HandoffError::io(&self.dir, e))?;

        self.write(GENESIS_PEERS_FILE, &serde_json::to_string_pretty(&ready.genesis_peers)?)?;
        self.write(CURRENT_PEERS_FILE, &serde_json::to_string_pretty(&ready.current_peers)?)?;

        let group = GroupFile {
            name: ready.group.name.clone(),
            uid: ready.group.uid.clone(),
            moniker: ready.moniker.clone(),
            discovery_addr: ready.target.to_string(),
        };
        self.write(GROUP_FILE, &toml::to_string_pretty(&group)?)?;

        info!(
            "handoff: wrote {} genesis and {} current peers to {}",
            ready.genesis_peers.len(),
            ready.current_peers.len(),
            self.dir.display()
        );
        Ok(())
    }
}

/// A group restored from a configuration directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedGroup {
    pub group: GroupDescriptor,
    pub moniker: String,
    pub discovery_addr: SocketAddr,
    pub genesis_peers: Vec<Peer>,
    pub current_peers: Vec<Peer>,
}

impl ArchivedGroup {
    /// A service record carrying both rosters, for the archive provider.
    pub fn to_record(&self) -> ServiceRecord {
        let mut record = ServiceRecord::new(
            "",
            format!("archive-{}", self.group.uid),
            self.discovery_addr.ip(),
            self.discovery_addr.port(),
            &self.group,
        );
        record.genesis_peers = Some(self.genesis_peers.clone());
        record.current_peers = Some(self.current_peers.clone());
        record
    }
}

fn read(dir: &Path, name: &str) -> Result<String, HandoffError> {
    let path = dir.join(name);
    fs::read_to_string(&path).map_err(|e| HandoffError::io(path, e))
}

pub fn load_archive(dir: &Path) -> Result<ArchivedGroup, HandoffError> {
    let group: GroupFile = toml::from_str(&read(dir, GROUP_FILE)?)?;
    let discovery_addr = group
        .discovery_addr
        .parse()
        .map_err(|_| HandoffError::InvalidAddr(group.discovery_addr.clone()))?;
    let genesis_peers = serde_json::from_str(&read(dir, GENESIS_PEERS_FILE)?)?;
    let current_peers = serde_json::from_str(&read(dir, CURRENT_PEERS_FILE)?)?;

    Ok(ArchivedGroup {
        group: GroupDescriptor::new(group.name, group.uid),
        moniker: group.moniker,
        discovery_addr,
        genesis_peers,
        current_peers,
    })
}
