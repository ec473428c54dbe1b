//! Dedup and persistence gate.
//!
//! For each record, in batch order: look it up by link, insert it if unknown,
//! and announce the new id exactly once. A duplicate reported by the store on
//! insert counts as already known. Only one cycle runs per scrape target at a
//! time, so check-then-insert needs no extra locking; the store's unique link
//! constraint backs it up regardless.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{ListingId, ListingRecord};
use crate::publisher::ListingPublisher;
use crate::store::{InsertOutcome, ListingStore};

/// What the gate did with one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GateReport {
    /// Ids of newly persisted listings, in persistence order
    pub inserted: Vec<ListingId>,
    /// Records whose link was already stored
    pub known: usize,
    /// Inserted records whose announcement failed
    pub unpublished: usize,
    /// Records left unprocessed because of shutdown
    pub skipped: usize,
}

pub struct DedupGate {
    store: Arc<dyn ListingStore>,
    publisher: ListingPublisher,
}

impl DedupGate {
    pub fn new(store: Arc<dyn ListingStore>, publisher: ListingPublisher) -> Self {
        Self { store, publisher }
    }

    /// Persist and announce the new records of a batch
    ///
    /// Shutdown is honoured between records, never inside one: a record whose
    /// insert is under way when `shutdown` fires is still announced, so the
    /// publisher must stay up until this returns. Store errors abort the batch
    /// and are returned to the caller.
    pub async fn process(
        &self,
        batch: Vec<ListingRecord>,
        shutdown: &CancellationToken,
    ) -> Result<GateReport> {
        let mut report = GateReport::default();
        let total = batch.len();

        for (idx, record) in batch.into_iter().enumerate() {
            if shutdown.is_cancelled() {
                report.skipped = total - idx;
                warn!("Shutdown requested, leaving {} listings unprocessed", report.skipped);
                break;
            }

            match self.admit(&record).await? {
                Some(id) => {
                    if !self.publisher.announce(id).await {
                        report.unpublished += 1;
                    }
                    report.inserted.push(id);
                }
                None => report.known += 1,
            }
        }

        Ok(report)
    }

    /// Insert the record if its link is new, returning the fresh id
    async fn admit(&self, record: &ListingRecord) -> Result<Option<ListingId>> {
        let existing = self
            .store
            .find_by_link(&record.link)
            .await
            .with_context(|| format!("Failed to look up {}", record.link))?;

        if existing.is_some() {
            info!(link = %record.link, "Listing already exists: {}", record.title);
            return Ok(None);
        }

        let outcome = self
            .store
            .insert(record)
            .await
            .with_context(|| format!("Failed to insert {}", record.link))?;

        match outcome {
            InsertOutcome::Inserted(id) => {
                info!(id = %id, link = %record.link, "Saved new listing: {}", record.title);
                Ok(Some(id))
            }
            InsertOutcome::Duplicate => {
                info!(link = %record.link, "Listing stored concurrently: {}", record.title);
                Ok(None)
            }
        }
    }
}
