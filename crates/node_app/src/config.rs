//! `meshjoin.toml`: every field optional, a missing file means defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use node_join::{FirstService, RandomService, ServiceSelector};
use node_peer_client::ClientConfig;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "meshjoin.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Found a group and serve its rosters.
    Host,
    /// Discover a group and join it.
    Join,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    First,
    Random,
}

impl Selection {
    pub fn selector(self) -> Box<dyn ServiceSelector> {
        match self {
            Self::First => Box::new(FirstService),
            Self::Random => Box::new(RandomService),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_moniker")]
    pub moniker: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_engine_port")]
    pub engine_port: u16,
    #[serde(default)]
    pub public_key_hex: Option<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    /// Uid of the hosted group; generated when unset.
    #[serde(default)]
    pub group_uid: Option<String>,
    /// Group to join; the first group discovered when unset.
    #[serde(default)]
    pub join_group_uid: Option<String>,
    #[serde(default = "default_selection")]
    pub selection: Selection,
    #[serde(default = "default_true")]
    pub enable_mdns: bool,
    #[serde(default)]
    pub signaling_url: Option<String>,
    #[serde(default = "default_signaling_interval")]
    pub signaling_interval_secs: u64,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    /// Configuration directory of an earlier join to restore.
    #[serde(default)]
    pub restore_archive: Option<PathBuf>,
    #[serde(default)]
    pub peer_client: ClientConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_moniker() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "meshjoin-node".into())
}
fn default_app_id() -> String {
    "meshjoin".into()
}
fn default_mode() -> Mode {
    Mode::Join
}
fn default_listen_host() -> String {
    "0.0.0.0".into()
}
fn default_discovery_port() -> u16 {
    8000
}
fn default_engine_port() -> u16 {
    1337
}
fn default_group_name() -> String {
    "meshjoin group".into()
}
fn default_selection() -> Selection {
    Selection::First
}
fn default_true() -> bool {
    true
}
fn default_signaling_interval() -> u64 {
    30
}
fn default_discovery_timeout() -> u64 {
    60
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            moniker: default_moniker(),
            app_id: default_app_id(),
            mode: default_mode(),
            listen_host: default_listen_host(),
            discovery_port: default_discovery_port(),
            engine_port: default_engine_port(),
            public_key_hex: None,
            group_name: default_group_name(),
            group_uid: None,
            join_group_uid: None,
            selection: default_selection(),
            enable_mdns: true,
            signaling_url: None,
            signaling_interval_secs: default_signaling_interval(),
            discovery_timeout_secs: default_discovery_timeout(),
            restore_archive: None,
            peer_client: ClientConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<NodeConfig> {
    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    } else {
        Ok(NodeConfig::default())
    }
}
