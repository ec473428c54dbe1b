use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::scrapers::parse::SITE_BASE_URL;

/// Real estate offers in Augsburg and surroundings
pub const DEFAULT_SCRAPE_URL: &str =
    "https://www.kleinanzeigen.de/s-immobilien/augsburg/anzeige:angebote/c195l7518r20";

/// A search page to scrape and the base its relative links resolve against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTarget {
    /// Search result page URL
    pub url: String,
    /// Site root for relative listing links
    pub base_url: String,
}

impl ScrapeTarget {
    /// Create a target on the Kleinanzeigen site
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_url: SITE_BASE_URL.to_string(),
        }
    }

    /// Parsed base URL
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL '{}'", self.base_url))
    }
}

impl Default for ScrapeTarget {
    fn default() -> Self {
        Self::new(DEFAULT_SCRAPE_URL)
    }
}
