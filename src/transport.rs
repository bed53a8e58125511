// src/transport.rs

use crate::config::HttpDetails;
use crate::error::{AadJwtError, RetrieveCause};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const BASE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Fetches JSON documents from the identity provider.
///
/// Connect and timeout errors are retried up to `max_retries` times with a
/// doubling delay. Non-2xx responses and unparseable bodies fail immediately.
#[derive(Clone)]
pub(crate) struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub(crate) fn new(http: &HttpDetails) -> Result<Self, AadJwtError> {
        let mut builder = reqwest::Client::builder();
        if http.danger_accept_invalid_certs {
            warn!("TLS certificate verification is disabled for identity provider requests");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = http.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AadJwtError::InvalidConfiguration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: http.max_retries,
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, AadJwtError> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| AadJwtError::retrieve(url, e))
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, AadJwtError> {
        let mut delay = BASE_RETRY_DELAY;
        let mut attempt = 0;
        loop {
            match self.try_get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    warn!("GET {} failed: {}. Retry {} of {} in {:?}.", url, e, attempt, self.max_retries, delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(AadJwtError::retrieve(url, RetrieveCause::Http(e))),
            }
        }
    }

    async fn try_get(&self, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.status().is_none() && (error.is_connect() || error.is_timeout())
}
