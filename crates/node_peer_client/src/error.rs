use thiserror::Error;

/// Why a peer-list request failed. Delivered as a value, never as a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeersError {
    #[error("peer list was not valid JSON")]
    InvalidJson,
    #[error("could not connect to peer")]
    ConnectionError,
    #[error("peer request timed out")]
    Timeout,
    #[error("peer request failed")]
    Unknown,
}

impl PeersError {
    /// Map a transport error. Deadlines are checked first, since a connect
    /// timeout is also reported as a connect error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ConnectionError
        } else {
            Self::Unknown
        }
    }
}
