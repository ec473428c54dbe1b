//! Publish/subscribe broker client.
//!
//! A background task owns the NATS connection and moves through
//! `Disconnected → Connecting → Connected`. Callers hold a cheap [`Broker`]
//! handle exposing only `publish` and `subscribe`; commands issued while the
//! connection is down fail immediately instead of queueing.
//!
//! ```text
//! Broker handle ──commands──► broker task ──► async_nats::Client
//!        ▲                        │
//!        └──── watch<ConnectionState>
//! ```

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_nats::{ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state of the broker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// How the broker task retries a lost or failed connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_attempts: Option<usize>,
}

impl ReconnectPolicy {
    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: usize) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reconnect: ReconnectPolicy,
}

/// Trait for publish operations.
///
/// This allows swapping between the real broker and test mocks.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a message to a subject.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

enum Command {
    Publish {
        subject: String,
        payload: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        subject: String,
        reply: oneshot::Sender<Result<async_nats::Subscriber>>,
    },
}

impl Command {
    fn reject(self, reason: &str) {
        match self {
            Command::Publish { reply, .. } => {
                let _ = reply.send(Err(anyhow!("{}", reason)));
            }
            Command::Subscribe { reply, .. } => {
                let _ = reply.send(Err(anyhow!("{}", reason)));
            }
        }
    }
}

/// Handle to the background broker task
#[derive(Clone)]
pub struct Broker {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl Broker {
    /// Spawn the broker task; it runs until `shutdown` is cancelled or the
    /// reconnect policy gives up
    pub fn spawn(options: BrokerOptions, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let handle = tokio::spawn(run(options, commands_rx, state_tx, shutdown));

        (
            Self {
                commands: commands_tx,
                state: state_rx,
            },
            handle,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the task reports `Connected`, or fail if the task stops
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| anyhow!("Broker task stopped before connecting"))
    }

    /// Like [`Broker::wait_connected`], but gives up once `shutdown` fires.
    /// Returns `Ok(false)` when shutdown came first.
    pub async fn wait_connected_until(&self, shutdown: &CancellationToken) -> Result<bool> {
        tokio::select! {
            res = self.wait_connected() => res.map(|_| true),
            _ = shutdown.cancelled() => Ok(false),
        }
    }

    pub async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish {
            subject,
            payload,
            reply,
        })
        .await?;
        rx.await.context("Broker task dropped the publish request")?
    }

    pub async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { subject, reply }).await?;
        rx.await.context("Broker task dropped the subscribe request")?
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Broker task is not running"))
    }
}

#[async_trait]
impl EventPublisher for Broker {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        Broker::publish(self, subject, payload).await
    }
}

async fn connect(
    options: &BrokerOptions,
    events: mpsc::UnboundedSender<Event>,
) -> Result<async_nats::Client> {
    let base = match (&options.username, &options.password) {
        (Some(user), Some(pass)) => ConnectOptions::with_user_and_password(user.clone(), pass.clone()),
        _ => ConnectOptions::new(),
    };

    let delay = options.reconnect.delay;
    base.max_reconnects(options.reconnect.max_attempts)
        .reconnect_delay_callback(move |_attempts| delay)
        .event_callback(move |event| {
            let events = events.clone();
            async move {
                let _ = events.send(event);
            }
        })
        .connect(options.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to broker at {}", options.url))
}

async fn run(
    options: BrokerOptions,
    mut commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client: Option<async_nats::Client> = None;
    let mut failures = 0usize;

    loop {
        if client.is_none() {
            state.send_replace(ConnectionState::Connecting);
            match connect(&options, events_tx.clone()).await {
                Ok(c) => {
                    info!(url = %options.url, "Connected to the broker");
                    state.send_replace(ConnectionState::Connected);
                    failures = 0;
                    client = Some(c);
                }
                Err(e) => {
                    failures += 1;
                    state.send_replace(ConnectionState::Disconnected);
                    if !options.reconnect.allows(failures) {
                        error!(attempts = failures, "Giving up on broker connection: {:#}", e);
                        break;
                    }
                    warn!(attempt = failures, "Broker connection failed: {:#}", e);
                    if !backoff(options.reconnect.delay, &mut commands, &shutdown).await {
                        break;
                    }
                }
            }
            continue;
        }
        let Some(connected) = client.as_ref() else {
            continue;
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(event) = events.recv() => match event {
                Event::Connected => {
                    info!("Reconnected to the broker");
                    state.send_replace(ConnectionState::Connected);
                }
                Event::Disconnected => {
                    warn!("Lost broker connection, reconnecting");
                    state.send_replace(ConnectionState::Connecting);
                }
                Event::ClientError(async_nats::ClientError::MaxReconnects) => {
                    error!("Broker reconnect attempts exhausted");
                    state.send_replace(ConnectionState::Disconnected);
                    break;
                }
                other => debug!("Broker event: {:?}", other),
            },
            command = commands.recv() => match command {
                Some(command) => {
                    if *state.borrow() == ConnectionState::Connected {
                        execute(connected, command).await;
                    } else {
                        command.reject("Broker is not connected");
                    }
                }
                None => break,
            },
        }
    }

    if let Some(client) = client {
        if let Err(e) = client.flush().await {
            warn!("Failed to flush pending broker messages: {}", e);
        }
    }
    state.send_replace(ConnectionState::Disconnected);
    info!("Disconnected from the broker");
}

/// Wait out the reconnect delay, rejecting commands meanwhile
///
/// Returns `false` when the task should stop.
async fn backoff(
    delay: Duration,
    commands: &mut mpsc::Receiver<Command>,
    shutdown: &CancellationToken,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            _ = shutdown.cancelled() => return false,
            command = commands.recv() => match command {
                Some(command) => command.reject("Broker is not connected"),
                None => return false,
            },
        }
    }
}

async fn execute(client: &async_nats::Client, command: Command) {
    match command {
        Command::Publish {
            subject,
            payload,
            reply,
        } => {
            let result = client
                .publish(subject, payload)
                .await
                .context("Failed to publish message");
            let _ = reply.send(result);
        }
        Command::Subscribe { subject, reply } => {
            let result = client
                .subscribe(subject)
                .await
                .context("Failed to subscribe");
            let _ = reply.send(result);
        }
    }
}

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Publisher that records messages instead of sending them.
///
/// Can be switched into a failing mode to exercise delivery failures.
#[derive(Default)]
pub struct TestPublisher {
    published: RwLock<Vec<PublishedMessage>>,
    failing: RwLock<bool>,
}

impl TestPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish fails.
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.set_failing(true);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// Payloads published to a subject, decoded as UTF-8.
    pub fn payloads_for(&self, subject: &str) -> Vec<String> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .map(|m| String::from_utf8_lossy(&m.payload).into_owned())
            .collect()
    }

    /// Get the count of published messages.
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl EventPublisher for TestPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        if *self.failing.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(anyhow!("publish to {} refused", subject));
        }
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(10_000));
    }

    #[test]
    fn bounded_policy_stops_at_limit() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(3),
        };
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[tokio::test]
    async fn test_publisher_records_and_fails_on_demand() {
        let publisher = TestPublisher::new();
        publisher
            .publish("scraper".into(), Bytes::from("7"))
            .await
            .unwrap();
        assert_eq!(publisher.payloads_for("scraper"), vec!["7".to_string()]);

        publisher.set_failing(true);
        assert!(publisher.publish("scraper".into(), Bytes::from("8")).await.is_err());
        assert_eq!(publisher.publish_count(), 1);
    }

    #[tokio::test]
    async fn broker_gives_up_when_policy_is_exhausted() {
        let shutdown = CancellationToken::new();
        let (broker, handle) = Broker::spawn(
            BrokerOptions {
                url: "nats://127.0.0.1:1".into(),
                username: None,
                password: None,
                reconnect: ReconnectPolicy {
                    delay: Duration::from_millis(10),
                    max_attempts: Some(1),
                },
            },
            shutdown,
        );

        handle.await.unwrap();

        assert_eq!(broker.state(), ConnectionState::Disconnected);
        assert!(broker.wait_connected().await.is_err());
        assert!(broker.publish("scraper".into(), Bytes::from("1")).await.is_err());
    }

    #[tokio::test]
    async fn waiting_for_connection_yields_to_shutdown() {
        let broker_shutdown = CancellationToken::new();
        let (broker, handle) = Broker::spawn(
            BrokerOptions {
                url: "nats://127.0.0.1:1".into(),
                username: None,
                password: None,
                reconnect: ReconnectPolicy {
                    delay: Duration::from_millis(10),
                    max_attempts: None,
                },
            },
            broker_shutdown.clone(),
        );

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let connected = tokio::time::timeout(
            Duration::from_secs(5),
            broker.wait_connected_until(&shutdown),
        )
        .await
        .expect("wait did not yield to shutdown")
        .unwrap();
        assert!(!connected);

        broker_shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("broker task did not stop")
            .unwrap();
    }
}
