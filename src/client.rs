//! HTTP seam between the fetch loop and the tile server.

use anyhow::{Context, Result};
use reqwest::{header, StatusCode};
use std::{future::Future, time::Duration};
use tracing::trace;

use crate::error::TransportError;

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Status and body of a single tile request.
#[derive(Clone, Debug, PartialEq)]
pub struct TileResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Anything able to issue a plain GET for a tile URL.
///
/// The fetch loop only ever talks to this trait, which lets tests replace the
/// remote server with a scripted one.
pub trait TileClient: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<TileResponse, TransportError>> + Send;
}

/// [`TileClient`] backed by reqwest.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Builds a client identifying itself with `user_agent` on every request.
    ///
    /// Pass the zero duration as `timeout` to disable the per-request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if timeout > ZERO_DURATION {
            builder = builder.timeout(timeout);
        }

        let mut headers = header::HeaderMap::new();
        headers.append(
            header::USER_AGENT,
            user_agent
                .parse()
                .context("user agent is not a valid header value")?,
        );

        let client = builder
            .default_headers(headers)
            .build()
            .context("failed creating HTTP client")?;

        Ok(Self { client })
    }
}

impl TileClient for HttpClient {
    async fn get(&self, url: &str) -> Result<TileResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        trace!(url = url, status = status.as_u16(), "HTTP response received");

        // only successful bodies are ever persisted
        let body = if status == StatusCode::OK {
            response.bytes().await?.to_vec()
        } else {
            Vec::new()
        };

        Ok(TileResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_user_agent() {
        assert!(HttpClient::new("bad\nagent", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn builds_without_timeout() {
        assert!(HttpClient::new("tile-prefetcher tests", ZERO_DURATION).is_ok());
    }
}
