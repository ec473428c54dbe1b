use crate::scrapers::traits::ImageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches listing thumbnails over plain HTTP
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to download image {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Image {} returned status: {}", url, response.status());
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => {
                debug!("Downloaded {} bytes of image data from {}", bytes.len(), url);
                Some(bytes.to_vec())
            }
            Err(e) => {
                warn!("Failed to read image body {}: {}", url, e);
                None
            }
        }
    }
}
