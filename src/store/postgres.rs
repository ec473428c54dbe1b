use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::{InsertOutcome, ListingStore};
use crate::models::{ListingId, ListingRecord, StoredListing};

/// Postgres-backed listing store
#[derive(Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    /// Connect to the database and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Connected to database");
        Ok(Self { pool })
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn find_by_link(&self, link: &str) -> Result<Option<StoredListing>> {
        let listing = sqlx::query_as::<_, StoredListing>("SELECT * FROM listings WHERE link = $1")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(listing)
    }

    async fn find_by_id(&self, id: ListingId) -> Result<Option<StoredListing>> {
        let listing = sqlx::query_as::<_, StoredListing>("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(listing)
    }

    /// Insert with `ON CONFLICT DO NOTHING` so a concurrent writer of the same
    /// link yields `Duplicate` rather than a constraint violation
    async fn insert(&self, record: &ListingRecord) -> Result<InsertOutcome> {
        let id = sqlx::query_scalar::<_, ListingId>(
            "INSERT INTO listings (title, location, distance_km, posted_at, image, link)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (link) DO NOTHING
             RETURNING id",
        )
        .bind(&record.title)
        .bind(&record.location)
        .bind(record.distance_km)
        .bind(record.posted_at)
        .bind(record.image_data.as_deref())
        .bind(&record.link)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match id {
            Some(id) => InsertOutcome::Inserted(id),
            None => InsertOutcome::Duplicate,
        })
    }
}
