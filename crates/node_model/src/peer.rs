//! Consensus participant record and its wire form.
//!
//! Wire form: `{"NetAddr": "...", "PubKeyHex": "...", "Moniker": "..."}`.
//! Field names are exact; engines on the other side match them verbatim.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeer")]
pub struct Peer {
    #[serde(rename = "NetAddr")]
    net_addr: String,
    #[serde(rename = "PubKeyHex")]
    pub_key_hex: String,
    #[serde(rename = "Moniker")]
    moniker: String,
}

/// Decoding shape: every field optional so absence is reported by name.
#[derive(Deserialize)]
struct RawPeer {
    #[serde(rename = "NetAddr")]
    net_addr: Option<String>,
    #[serde(rename = "PubKeyHex")]
    pub_key_hex: Option<String>,
    #[serde(rename = "Moniker")]
    moniker: Option<String>,
}

impl TryFrom<RawPeer> for Peer {
    type Error = ModelError;

    fn try_from(raw: RawPeer) -> Result<Self> {
        Peer::from_parts(raw.pub_key_hex, raw.net_addr, raw.moniker)
    }
}

impl Peer {
    pub fn new(
        pub_key_hex: impl Into<String>,
        net_addr: impl Into<String>,
        moniker: impl Into<String>,
    ) -> Self {
        Self {
            net_addr: net_addr.into(),
            pub_key_hex: pub_key_hex.into(),
            moniker: moniker.into(),
        }
    }

    /// Build a peer from possibly-absent parts. Fails on the first absent field.
    pub fn from_parts(
        pub_key_hex: Option<String>,
        net_addr: Option<String>,
        moniker: Option<String>,
    ) -> Result<Self> {
        let pub_key_hex = pub_key_hex.ok_or(ModelError::MissingField("PubKeyHex"))?;
        let net_addr = net_addr.ok_or(ModelError::MissingField("NetAddr"))?;
        let moniker = moniker.ok_or(ModelError::MissingField("Moniker"))?;
        Ok(Self::new(pub_key_hex, net_addr, moniker))
    }

    pub fn pub_key_hex(&self) -> &str {
        &self.pub_key_hex
    }

    pub fn net_addr(&self) -> &str {
        &self.net_addr
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.moniker, self.net_addr)
    }
}
