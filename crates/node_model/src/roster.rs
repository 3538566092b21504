//! Which peer roster a node is asked for, and where it is served.

/// Path of the live roster. Also the single-roster endpoint.
pub const CURRENT_PEERS_PATH: &str = "/peers";
/// Path of the founding roster.
pub const GENESIS_PEERS_PATH: &str = "/genesispeers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Roster {
    /// The immutable roster the group started with.
    Genesis,
    /// The live roster including membership changes since genesis.
    Current,
}

impl Roster {
    pub fn path(self) -> &'static str {
        match self {
            Self::Genesis => GENESIS_PEERS_PATH,
            Self::Current => CURRENT_PEERS_PATH,
        }
    }
}

impl std::fmt::Display for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Genesis => write!(f, "genesis"),
            Self::Current => write!(f, "current"),
        }
    }
}
