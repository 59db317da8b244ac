//! HTTP audio download

use async_trait::async_trait;
use lyra_common::{Error, Result};
use std::time::Duration;

use crate::services::providers::AudioFetcher;

const USER_AGENT: &str = concat!("lyra-enrich/", env!("CARGO_PKG_VERSION"));

pub struct HttpAudioFetcher {
    http_client: reqwest::Client,
}

impl HttpAudioFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "Downloading audio");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::AudioFetch(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AudioFetch(format!(
                "{} responded with HTTP {}",
                url,
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::AudioFetch(format!("reading body from {} failed: {}", url, e)))?;

        Ok(bytes.to_vec())
    }
}
