//! Periodic Kleinanzeigen real estate scraper.
//!
//! ```text
//! Scheduler (every SCRAPE_INTERVAL)
//!     │
//!     ├─► PageSource::fetch_page (headless Chrome)
//!     ├─► KleinanzeigenExtractor::extract
//!     │       └─► parse_fragment → validate → fetch image
//!     └─► DedupGate::process
//!             ├─► ListingStore::find_by_link / insert
//!             └─► ListingPublisher::announce (broker topic)
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod messaging;
pub mod models;
pub mod notifier;
pub mod publisher;
pub mod scheduler;
pub mod scrapers;
pub mod store;
