//! Durable listing storage.
//!
//! The core only ever looks listings up by link or id and inserts new ones.
//! Uniqueness of `link` is enforced by the store itself, so a racing insert
//! of a known link reports [`InsertOutcome::Duplicate`] instead of failing.

mod memory;
mod postgres;

pub use memory::InMemoryListingStore;
pub use postgres::PgListingStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ListingId, ListingRecord, StoredListing};

/// Result of proposing a record to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Record persisted under a fresh id
    Inserted(ListingId),
    /// A record with the same link already exists
    Duplicate,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Find a stored listing by its link
    async fn find_by_link(&self, link: &str) -> Result<Option<StoredListing>>;

    /// Find a stored listing by its durable id
    async fn find_by_id(&self, id: ListingId) -> Result<Option<StoredListing>>;

    /// Insert a record unless its link is already stored
    async fn insert(&self, record: &ListingRecord) -> Result<InsertOutcome>;
}
