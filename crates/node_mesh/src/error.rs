use thiserror::Error;

use node_model::ModelError;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("provider has no uid; call set_uid before starting")]
    MissingUid,
    #[error("discovery is already running")]
    AlreadyRunning,
    #[error("discovery session can only run once")]
    SessionExhausted,
    #[error("unknown provider {0}")]
    UnknownProvider(String),
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
    #[error("invalid signaling endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
