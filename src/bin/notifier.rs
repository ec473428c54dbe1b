use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use listing_scout::config::NotifierConfig;
use listing_scout::messaging::Broker;
use listing_scout::notifier::{Notifier, TelegramSender};
use listing_scout::store::PgListingStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting the notifier service.");

    let config = NotifierConfig::from_env()?;
    let store = Arc::new(PgListingStore::connect(&config.database_url).await?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Notifier stopped manually.");
        signal.cancel();
    });

    let broker_shutdown = CancellationToken::new();
    let (broker, broker_task) = Broker::spawn(config.broker.clone(), broker_shutdown.clone());
    if !broker.wait_connected_until(&shutdown).await? {
        broker_shutdown.cancel();
        let _ = broker_task.await;
        store.close().await;
        return Ok(());
    }

    let mut messages = broker.subscribe(config.topic.clone()).await?;
    info!("Subscribed to topic `{}` and waiting for messages.", config.topic);

    let notifier = Notifier::new(
        store.clone(),
        Arc::new(TelegramSender::new(
            &config.telegram_bot_token,
            config.telegram_chat_id.clone(),
        )?),
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = messages.next() => match message {
                Some(message) => {
                    notifier.handle(&message.payload).await;
                }
                None => {
                    warn!("Subscription closed");
                    break;
                }
            },
        }
    }

    broker_shutdown.cancel();
    let _ = broker_task.await;
    store.close().await;

    Ok(())
}
