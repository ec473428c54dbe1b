use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Durable identifier assigned by the store on insert
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ListingId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ListingId)
    }
}

/// A validated real estate listing, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    pub location: String,
    pub distance_km: f64,
    pub posted_at: DateTime<Utc>,
    /// Raw image bytes, absent when the image could not be fetched
    #[serde(skip)]
    pub image_data: Option<Vec<u8>>,
    /// Absolute URL of the ad; the identity key
    pub link: String,
}

/// Raw field values pulled out of one listing fragment, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFields {
    pub title: Option<String>,
    pub link: Option<String>,
    pub location: String,
    pub distance: String,
    pub posted_at: Option<String>,
    pub image_url: Option<String>,
}

/// A listing row as stored in the `listings` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredListing {
    pub id: ListingId,
    pub title: String,
    pub location: String,
    pub distance_km: f64,
    pub posted_at: DateTime<Utc>,
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

impl StoredListing {
    /// Build the durable form of a record once the store has assigned an id
    pub fn from_record(id: ListingId, record: &ListingRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: record.title.clone(),
            location: record.location.clone(),
            distance_km: record.distance_km,
            posted_at: record.posted_at,
            image: record.image_data.clone(),
            link: record.link.clone(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_id_round_trips_through_payload_text() {
        let id = ListingId(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(" 42\n".parse::<ListingId>().unwrap(), id);
        assert!("forty-two".parse::<ListingId>().is_err());
    }
}
