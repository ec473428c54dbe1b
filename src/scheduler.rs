//! Drives the fetch → extract → gate cycle on a fixed interval.
//!
//! The interval is measured from the end of one cycle to the start of the
//! next, so a slow cycle delays the next one instead of overlapping it. A
//! failed cycle is logged and the scheduler goes back to waiting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::gate::{DedupGate, GateReport};
use crate::scrapers::{KleinanzeigenExtractor, PageSource, ScrapeTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting out the interval
    Idle,
    /// Fetch, extract and gate in progress
    Cycling,
}

/// Outcome of one completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub extracted: usize,
    pub gate: GateReport,
}

pub struct Scheduler {
    target: ScrapeTarget,
    pages: Arc<dyn PageSource>,
    extractor: KleinanzeigenExtractor,
    gate: DedupGate,
    interval: Duration,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        target: ScrapeTarget,
        pages: Arc<dyn PageSource>,
        extractor: KleinanzeigenExtractor,
        gate: DedupGate,
        interval: Duration,
    ) -> Self {
        Self {
            target,
            pages,
            extractor,
            gate,
            interval,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run cycles until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Scheduler started for {} (every {}s)",
            self.target.url,
            self.interval.as_secs()
        );

        while !shutdown.is_cancelled() {
            self.state = SchedulerState::Cycling;
            info!("Scraping started at {}", Utc::now());

            match self.run_cycle(&shutdown).await {
                Ok(report) => info!(
                    "Scraping finished: {} extracted, {} new, {} already known",
                    report.extracted,
                    report.gate.inserted.len(),
                    report.gate.known
                ),
                Err(e) => error!("Error during scraping: {:#}", e),
            }

            self.state = SchedulerState::Idle;
            info!("Next scrape in {} seconds", self.interval.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Scheduler stopped");
    }

    /// One fetch → extract → gate pass
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let html = tokio::select! {
            html = self.pages.fetch_page(&self.target.url) => html
                .with_context(|| format!("Failed to fetch {} via {}", self.target.url, self.pages.source_name()))?,
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, abandoning page fetch");
                return Ok(CycleReport {
                    extracted: 0,
                    gate: GateReport::default(),
                });
            }
        };

        let today = Utc::now().date_naive();
        let batch = self.extractor.extract(&html, today).await;
        let extracted = batch.len();

        let gate = self.gate.process(batch, shutdown).await?;

        Ok(CycleReport { extracted, gate })
    }
}
