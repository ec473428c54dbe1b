use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::messaging::{BrokerOptions, ReconnectPolicy};
use crate::scrapers::types::DEFAULT_SCRAPE_URL;

/// Scraper daemon configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub broker: BrokerOptions,
    pub topic: String,
    pub scrape_url: String,
    pub scrape_interval: Duration,
    pub page_load_wait: Duration,
    pub image_fetch_concurrency: usize,
}

/// Notifier daemon configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub database_url: String,
    pub broker: BrokerOptions,
    pub topic: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            broker: broker_options(&var)?,
            topic: var("BROKER_TOPIC").unwrap_or_else(|| "scraper".to_string()),
            scrape_url: var("SCRAPE_URL").unwrap_or_else(|| DEFAULT_SCRAPE_URL.to_string()),
            scrape_interval: Duration::from_secs(parse_or(&var, "SCRAPE_INTERVAL", 60)?),
            page_load_wait: Duration::from_secs(parse_or(&var, "PAGE_LOAD_WAIT", 5)?),
            image_fetch_concurrency: parse_or(&var, "IMAGE_FETCH_CONCURRENCY", 4)?,
        })
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            broker: broker_options(&var)?,
            topic: var("BROKER_TOPIC").unwrap_or_else(|| "scraper".to_string()),
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN must be set")?,
            telegram_chat_id: var("TELEGRAM_CHAT_ID").context("TELEGRAM_CHAT_ID must be set")?,
        })
    }
}

fn broker_options(var: &impl Fn(&str) -> Option<String>) -> Result<BrokerOptions> {
    let max_attempts = match var("BROKER_MAX_RECONNECTS") {
        Some(raw) => Some(
            raw.parse()
                .context("BROKER_MAX_RECONNECTS must be a valid number")?,
        ),
        None => None,
    };

    Ok(BrokerOptions {
        url: var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string()),
        username: var("NATS_USERNAME"),
        password: var("NATS_PASSWORD"),
        reconnect: ReconnectPolicy {
            delay: Duration::from_secs(parse_or(var, "BROKER_RECONNECT_DELAY", 5)?),
            max_attempts,
        },
    })
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.topic, "scraper");
        assert_eq!(config.scrape_interval, Duration::from_secs(60));
        assert_eq!(config.scrape_url, DEFAULT_SCRAPE_URL);
        assert_eq!(config.broker.url, "nats://localhost:4222");
        assert_eq!(config.broker.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("BROKER_TOPIC", "listings"),
            ("SCRAPE_INTERVAL", "120"),
            ("BROKER_MAX_RECONNECTS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.topic, "listings");
        assert_eq!(config.scrape_interval, Duration::from_secs(120));
        assert_eq!(config.broker.reconnect.max_attempts, Some(10));
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("SCRAPE_INTERVAL", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn notifier_requires_bot_credentials() {
        let result = NotifierConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")]));
        assert!(result.is_err());
    }
}
