use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info};

use crate::messaging::EventPublisher;
use crate::models::ListingId;

/// Announces newly persisted listings on a topic
///
/// The payload is the listing id as a decimal string. A failed publish is
/// logged and swallowed; the listing is already durable at this point.
#[derive(Clone)]
pub struct ListingPublisher {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl ListingPublisher {
    pub fn new(publisher: Arc<dyn EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    /// Publish one event for `id`; returns whether it was handed to the broker
    pub async fn announce(&self, id: ListingId) -> bool {
        let payload = Bytes::from(id.to_string());
        match self.publisher.publish(self.topic.clone(), payload).await {
            Ok(()) => {
                info!(id = %id, topic = %self.topic, "Published new listing");
                true
            }
            Err(e) => {
                error!(id = %id, topic = %self.topic, "Failed to publish new listing: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::TestPublisher;

    #[tokio::test]
    async fn announces_id_as_string() {
        let broker = Arc::new(TestPublisher::new());
        let publisher = ListingPublisher::new(broker.clone(), "scraper");

        assert!(publisher.announce(ListingId(17)).await);

        assert_eq!(broker.payloads_for("scraper"), vec!["17".to_string()]);
    }

    #[tokio::test]
    async fn publish_failure_is_not_fatal() {
        let broker = Arc::new(TestPublisher::failing());
        let publisher = ListingPublisher::new(broker.clone(), "scraper");

        assert!(!publisher.announce(ListingId(1)).await);
        assert_eq!(broker.publish_count(), 0);
    }
}
