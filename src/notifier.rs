//! Downstream consumer: turns listing announcements into Telegram messages.
//!
//! Each announcement carries only a listing id; the listing is re-read from
//! the store before the message is built. Delivery is best effort.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, warn};

use crate::models::{ListingId, StoredListing};
use crate::store::ListingStore;

/// Render a listing as an HTML chat message
pub fn format_message(listing: &StoredListing) -> String {
    format!(
        "<b>Title:</b> {}\n<b>Location:</b> {}\n<b>Distance:</b> {:.1} km\n<b>Date:</b> {}\n<a href='{}'>View Listing</a>",
        escape_html(&listing.title),
        escape_html(&listing.location),
        listing.distance_km,
        listing.posted_at.format("%d.%m.%Y %H:%M"),
        escape_html(&listing.link),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}

/// Outbound chat channel
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage` client
pub struct TelegramSender {
    client: Client,
    api_url: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: format!("https://api.telegram.org/bot{}/sendMessage", bot_token),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("Failed to reach Telegram")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Telegram returned status {}: {}", status, body);
        }
        Ok(())
    }
}

/// What happened to one announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent(ListingId),
    UnknownListing(ListingId),
    MalformedPayload,
    Failed(ListingId),
}

pub struct Notifier {
    store: Arc<dyn ListingStore>,
    sender: Arc<dyn ChatSender>,
}

impl Notifier {
    pub fn new(store: Arc<dyn ListingStore>, sender: Arc<dyn ChatSender>) -> Self {
        Self { store, sender }
    }

    /// Handle one announcement payload; never fails, only reports
    pub async fn handle(&self, payload: &[u8]) -> Delivery {
        let text = String::from_utf8_lossy(payload);
        let Ok(id) = text.parse::<ListingId>() else {
            warn!("Ignoring malformed announcement `{}`", text);
            return Delivery::MalformedPayload;
        };
        info!(id = %id, "Received new listing id");

        let listing = match self.store.find_by_id(id).await {
            Ok(Some(listing)) => listing,
            Ok(None) => {
                warn!(id = %id, "Listing not found in the database");
                return Delivery::UnknownListing(id);
            }
            Err(e) => {
                error!(id = %id, "Failed to load listing: {:#}", e);
                return Delivery::Failed(id);
            }
        };

        match self.sender.send(&format_message(&listing)).await {
            Ok(()) => {
                info!(id = %id, "Sent Telegram message for listing: {}", listing.title);
                Delivery::Sent(id)
            }
            Err(e) => {
                error!(id = %id, "Failed to send Telegram message: {:#}", e);
                Delivery::Failed(id)
            }
        }
    }
}
