//! Listing extraction for Kleinanzeigen search result pages.
//!
//! A result page carries one `div.aditem-main` (metadata) and one
//! `div.aditem-image` per ad, in the same order. Fragment `i` of each kind
//! belongs to the same ad.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{ListingRecord, ParsedFields};
use crate::scrapers::parse::{parse_fragment, selector, FragmentSelectors};
use crate::scrapers::traits::ImageFetcher;
use crate::scrapers::validate::validate;

/// Extracts validated listings from a rendered search page
pub struct KleinanzeigenExtractor {
    base: Url,
    main_selector: Selector,
    image_selector: Selector,
    fields: FragmentSelectors,
    images: Arc<dyn ImageFetcher>,
    image_concurrency: usize,
}

impl KleinanzeigenExtractor {
    pub fn new(base: Url, images: Arc<dyn ImageFetcher>, image_concurrency: usize) -> Result<Self> {
        Ok(Self {
            base,
            main_selector: selector("div.aditem-main")?,
            image_selector: selector("div.aditem-image")?,
            fields: FragmentSelectors::new()?,
            images,
            image_concurrency: image_concurrency.max(1),
        })
    }

    /// Raw fields for every metadata/image fragment pair, in page order
    pub fn parse_page(&self, html: &str) -> Vec<ParsedFields> {
        let document = Html::parse_document(html);

        let mains: Vec<_> = document.select(&self.main_selector).collect();
        let images: Vec<_> = document.select(&self.image_selector).collect();
        info!(
            "Found {} listing fragments and {} image fragments",
            mains.len(),
            images.len()
        );
        if mains.len() != images.len() {
            warn!(
                "Fragment count mismatch, pairing only the first {}",
                mains.len().min(images.len())
            );
        }

        mains
            .into_iter()
            .zip(images)
            .map(|(main, image)| parse_fragment(main, image, &self.fields, &self.base))
            .collect()
    }

    /// Parse, validate and attach images, newest listing first
    ///
    /// Candidates that fail validation are logged and skipped; the rest of the
    /// batch is unaffected.
    pub async fn extract(&self, html: &str, today: NaiveDate) -> Vec<ListingRecord> {
        let parsed = self.parse_page(html);
        let total = parsed.len();

        let mut candidates = Vec::with_capacity(total);
        for (idx, fields) in parsed.into_iter().enumerate() {
            match validate(&fields, today) {
                Ok(record) => {
                    debug!("Parsed listing {}: {}", idx, record.link);
                    candidates.push((record, fields.image_url));
                }
                Err(e) => warn!("Skipped listing {}: {}", idx, e),
            }
        }

        let mut records: Vec<ListingRecord> = stream::iter(candidates)
            .map(|(mut record, image_url)| {
                let images = Arc::clone(&self.images);
                async move {
                    if let Some(url) = image_url {
                        record.image_data = images.fetch_image(&url).await;
                    }
                    record
                }
            })
            .buffered(self.image_concurrency)
            .collect()
            .await;

        records.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));

        info!("Extracted {} of {} listings", records.len(), total);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::parse::SITE_BASE_URL;
    use async_trait::async_trait;

    struct FixedImages;

    #[async_trait]
    impl ImageFetcher for FixedImages {
        async fn fetch_image(&self, url: &str) -> Option<Vec<u8>> {
            if url.contains("broken") {
                None
            } else {
                Some(url.as_bytes().to_vec())
            }
        }
    }

    fn extractor() -> KleinanzeigenExtractor {
        KleinanzeigenExtractor::new(Url::parse(SITE_BASE_URL).unwrap(), Arc::new(FixedImages), 2)
            .unwrap()
    }

    fn listing(link: &str, date: &str, image: &str) -> String {
        format!(
            r#"<article class="aditem">
                 <div class="aditem-image"><a href="{link}"><img src="{image}"></a></div>
                 <div class="aditem-main">
                   <div class="aditem-main--top">
                     <div class="aditem-main--top--left">86150 Augsburg (ca. 2,5 km)</div>
                     <div class="aditem-main--top--right">{date}</div>
                   </div>
                   <h2><a class="ellipsis" href="{link}">Wohnung {link}</a></h2>
                 </div>
               </article>"#
        )
    }

    fn page(items: &[String]) -> String {
        format!("<html><body><ul>{}</ul></body></html>", items.join("\n"))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[tokio::test]
    async fn batch_is_sorted_newest_first() {
        let html = page(&[
            listing("/s-anzeige/1", "01.02.2023", "https://img/1.jpg"),
            listing("/s-anzeige/2", "Heute, 08:00", "https://img/2.jpg"),
            listing("/s-anzeige/3", "Gestern, 22:15", "https://img/3.jpg"),
        ]);

        let records = extractor().extract(&html, today()).await;

        let links: Vec<_> = records.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://www.kleinanzeigen.de/s-anzeige/2",
                "https://www.kleinanzeigen.de/s-anzeige/3",
                "https://www.kleinanzeigen.de/s-anzeige/1",
            ]
        );
        assert!(records.iter().all(|r| r.distance_km == 2.5));
        assert_eq!(records[0].image_data.as_deref(), Some(&b"https://img/2.jpg"[..]));
    }

    #[tokio::test]
    async fn malformed_fragment_does_not_abort_batch() {
        let html = page(&[
            listing("/s-anzeige/1", "Heute, 10:00", "https://img/1.jpg"),
            listing("/s-anzeige/2", "garbage", "https://img/2.jpg"),
            listing("/s-anzeige/3", "04.03.2024", "https://img/3.jpg"),
        ]);

        let records = extractor().extract(&html, today()).await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.link.ends_with("/2")));
    }

    #[tokio::test]
    async fn failed_image_keeps_record() {
        let html = page(&[listing("/s-anzeige/1", "Heute, 10:00", "https://img/broken.jpg")]);

        let records = extractor().extract(&html, today()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image_data, None);
    }

    #[test]
    fn fragments_pair_by_position() {
        let html = page(&[
            listing("/s-anzeige/1", "Heute, 10:00", "https://img/1.jpg"),
            listing("/s-anzeige/2", "Heute, 11:00", "https://img/2.jpg"),
        ]);

        let parsed = extractor().parse_page(&html);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].image_url.as_deref(), Some("https://img/2.jpg"));
        assert_eq!(
            parsed[1].link.as_deref(),
            Some("https://www.kleinanzeigen.de/s-anzeige/2")
        );
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extractor().parse_page("<html></html>").is_empty());
    }
}
