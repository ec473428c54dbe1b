use std::sync::Arc;

use anyhow::Result;
use listing_scout::config::Config;
use listing_scout::gate::DedupGate;
use listing_scout::messaging::Broker;
use listing_scout::publisher::ListingPublisher;
use listing_scout::scheduler::Scheduler;
use listing_scout::scrapers::{
    HeadlessChromePageSource, HttpImageFetcher, KleinanzeigenExtractor, ScrapeTarget,
};
use listing_scout::store::PgListingStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🏠 Listing Scout - Kleinanzeigen Scraper");

    let config = Config::from_env()?;

    // Unreachable store is fatal
    let store = Arc::new(PgListingStore::connect(&config.database_url).await?);

    // The broker outlives the scheduler so an in-flight announce still lands
    let shutdown = CancellationToken::new();
    let broker_shutdown = CancellationToken::new();
    let (broker, broker_task) = Broker::spawn(config.broker.clone(), broker_shutdown.clone());

    let target = ScrapeTarget::new(config.scrape_url.clone());
    let extractor = KleinanzeigenExtractor::new(
        target.base()?,
        Arc::new(HttpImageFetcher::new()?),
        config.image_fetch_concurrency,
    )?;
    let gate = DedupGate::new(
        store.clone(),
        ListingPublisher::new(Arc::new(broker), config.topic.clone()),
    );
    let mut scheduler = Scheduler::new(
        target,
        Arc::new(HeadlessChromePageSource::new(config.page_load_wait)),
        extractor,
        gate,
        config.scrape_interval,
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Scraper stopped manually.");
        signal.cancel();
    });

    scheduler.run(shutdown.clone()).await;

    broker_shutdown.cancel();
    let _ = broker_task.await;
    store.close().await;

    info!("Shutdown complete");
    Ok(())
}
