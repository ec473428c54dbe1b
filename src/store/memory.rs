use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{InsertOutcome, ListingStore};
use crate::models::{ListingId, ListingRecord, StoredListing};

/// Listing store held in process memory
///
/// Assigns ids sequentially from 1 and enforces link uniqueness the way the
/// `listings` table does. Used for tests.
#[derive(Default)]
pub struct InMemoryListingStore {
    rows: Mutex<Vec<StoredListing>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored listings in insertion order
    pub async fn all(&self) -> Vec<StoredListing> {
        self.rows.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn find_by_link(&self, link: &str) -> Result<Option<StoredListing>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.link == link).cloned())
    }

    async fn find_by_id(&self, id: ListingId) -> Result<Option<StoredListing>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn insert(&self, record: &ListingRecord) -> Result<InsertOutcome> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|row| row.link == record.link) {
            return Ok(InsertOutcome::Duplicate);
        }

        let id = ListingId(rows.len() as i64 + 1);
        rows.push(StoredListing::from_record(id, record, Utc::now()));
        Ok(InsertOutcome::Inserted(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(link: &str) -> ListingRecord {
        ListingRecord {
            title: "Haus".into(),
            location: "Augsburg".into(),
            distance_km: 1.0,
            posted_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            image_data: None,
            link: link.into(),
        }
    }

    #[tokio::test]
    async fn duplicate_link_is_not_inserted_twice() {
        let store = InMemoryListingStore::new();

        let first = store.insert(&record("https://x/1")).await.unwrap();
        let second = store.insert(&record("https://x/1")).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted(ListingId(1)));
        assert_eq!(second, InsertOutcome::Duplicate);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn lookups_by_link_and_id() {
        let store = InMemoryListingStore::new();
        store.insert(&record("https://x/1")).await.unwrap();
        store.insert(&record("https://x/2")).await.unwrap();

        let by_link = store.find_by_link("https://x/2").await.unwrap().unwrap();
        assert_eq!(by_link.id, ListingId(2));

        let by_id = store.find_by_id(ListingId(1)).await.unwrap().unwrap();
        assert_eq!(by_id.link, "https://x/1");

        assert!(store.find_by_link("https://x/3").await.unwrap().is_none());
    }
}
