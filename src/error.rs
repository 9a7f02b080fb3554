use reqwest::StatusCode;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Local failures that make any further progress impossible and abort the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed creating directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing tile to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("output path {} exists and is not a directory", .0.display())]
    OutputNotDirectory(PathBuf),
}

/// Failures talking to the tile server. These are recorded per tile and
/// never end the run.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RemoteError {
    /// The server has no tile at this position and zoom.
    #[error("tile not found")]
    NotFound,

    /// Network trouble or a server-side status; worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The server rejected the request itself.
    #[error("request rejected with {0}")]
    Client(StatusCode),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// A request that never produced an HTTP status.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };

        TransportError(format!("{}: {}", kind, e))
    }
}
