//! Random message fetching for the hotspot tab

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum HotspotError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Invalid response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Response body of the random message endpoint
#[derive(Debug, Deserialize)]
struct RandomMessage {
    message: String,
}

/// Fetches hotspot messages from a fixed endpoint
#[derive(Clone)]
pub struct HotspotFetcher {
    client: reqwest::Client,
    url: String,
}

impl HotspotFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HotspotError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HotspotError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the endpoint once and return its `message`
    pub async fn fetch(&self) -> Result<String, HotspotError> {
        debug!(url = %self.url, "Fetching hotspot message");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| HotspotError::Request {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HotspotError::Status {
                url: self.url.clone(),
                status: response.status(),
            });
        }

        let body: RandomMessage = response.json().await.map_err(|source| HotspotError::Body {
            url: self.url.clone(),
            source,
        })?;

        info!(url = %self.url, "Fetched hotspot message");
        Ok(body.message)
    }
}
