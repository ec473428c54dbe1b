use crate::scrapers::traits::PageSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Page source backed by headless Chrome
///
/// A fresh browser is launched for every fetch and torn down afterwards, so a
/// crashed Chrome only costs the current cycle.
pub struct HeadlessChromePageSource {
    settle_delay: Duration,
}

impl HeadlessChromePageSource {
    /// Create a page source that waits `settle_delay` for scripts to render listings
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    fn render(url: &str, settle_delay: Duration) -> Result<String> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        let tab = browser.new_tab().context("Failed to open browser tab")?;

        info!("Opening search page {}", url);
        tab.navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        tab.wait_until_navigated()
            .context("Timed out waiting for navigation")?;

        // Accept cookies if present
        if let Err(e) = tab.evaluate(
            r#"
            const button = document.querySelector('#gdpr-banner-accept, button[data-testid="gdpr-banner-accept"]');
            if (button) button.click();
            "#,
            false,
        ) {
            debug!("Cookie banner script failed: {}", e);
        }

        thread::sleep(settle_delay);

        let html = tab.get_content().context("Failed to read page HTML")?;
        debug!("Rendered {} bytes of HTML", html.len());

        if let Err(e) = tab.close(true) {
            warn!("Failed to close tab: {}", e);
        }

        Ok(html)
    }
}

#[async_trait]
impl PageSource for HeadlessChromePageSource {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let url = url.to_string();
        let settle_delay = self.settle_delay;

        tokio::task::spawn_blocking(move || Self::render(&url, settle_delay))
            .await
            .context("Browser task panicked")?
    }

    fn source_name(&self) -> &'static str {
        "headless-chrome"
    }
}
