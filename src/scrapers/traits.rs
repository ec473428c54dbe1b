use anyhow::Result;
use async_trait::async_trait;

/// Source of rendered search result pages
///
/// Implemented by the headless browser in production and by fixed markup in tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Return the fully rendered HTML of the page at `url`
    async fn fetch_page(&self, url: &str) -> Result<String>;

    /// Get the name of the page source
    fn source_name(&self) -> &'static str;
}

/// Best-effort fetcher for listing images
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the raw image bytes, or `None` when the image is unavailable
    async fn fetch_image(&self, url: &str) -> Option<Vec<u8>>;
}
