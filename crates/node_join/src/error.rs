use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("a join is already in progress or has not been reset")]
    Busy,
    #[error("group has no service to join through")]
    NoService,
}

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("peer list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encode group file: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("decode group file: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("invalid discovery address {0:?}")]
    InvalidAddr(String),
}

impl HandoffError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
