//! The relay client: connection manager, publish service and health reporter.
//!
//! # Concurrency
//!
//! ```text
//!  publish() ──┐                         ┌── connect()   (constructor, supervisor)
//!  health()  ──┼── read lock ──┐   ┌── write lock ──┼── drop teardown (supervisor)
//!  is_connected() (try_read) ──┘   │   └── close()
//!                            RwLock<ConnectionState>
//! ```
//!
//! Publishers hold the read lock for exactly one send. Anything that swaps
//! handles holds the write lock, so a send never runs on a handle that is
//! being replaced. A publish that started on a dying channel fails that
//! attempt and picks up the new channel on its next one.

use crate::error::ClientError;
use crate::health::HealthCheck;
use crate::metrics::RelayMetrics;
use crate::policy::{PublishPolicy, ReconnectPolicy};
use crate::state::{ConnectionPhase, ConnectionState, Link};
use crate::supervisor::Supervisor;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use ticket_relay_core::{
    Broker, BrokerChannel, BrokerConnection, BrokerError, ClosureNotifier, ConnectionClosed,
    Publishing, QueueStatus,
};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;

const HEALTH_COMPONENT: &str = "broker";

/// Immutable client configuration.
///
/// The broker address is not part of it: it belongs to the [`Broker`]
/// implementation handed to [`RelayClient::new`] (for RabbitMQ, the URI of
/// `RabbitMqBroker`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    /// Queue probed by [`RelayClient::health_check`]; empty skips the probe
    pub queue_name: String,
    /// Publish retry policy
    pub publish: PublishPolicy,
    /// Reconnection policy
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Create a configuration with default policies.
    #[must_use]
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            publish: PublishPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Replace the publish policy.
    #[must_use]
    pub const fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish = policy;
        self
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub const fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

/// Outcome of one publish attempt.
enum AttemptOutcome {
    Delivered,
    NotConnected,
    Closed,
    Failed(BrokerError),
}

/// State shared between the client handle and its supervisor task.
pub(crate) struct Shared {
    broker: Arc<dyn Broker>,
    pub(crate) config: ClientConfig,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    closures: mpsc::UnboundedSender<ConnectionClosed>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    /// Establish a connection and channel and install them.
    ///
    /// The handshake runs without holding the lock; only the swap takes the
    /// write lock. A connection whose channel cannot be opened is closed
    /// before the error is returned.
    pub(crate) async fn connect(&self) -> Result<(), ClientError> {
        {
            let mut state = self.state.write().await;
            if state.is_closed() {
                return Err(ClientError::Closed);
            }
            *state = ConnectionState::Connecting;
        }

        let (connection, channel) = match self.handshake().await {
            Ok(handles) => handles,
            Err(e) => {
                let mut state = self.state.write().await;
                if !state.is_closed() {
                    *state = ConnectionState::Disconnected {
                        last_error: Some(e.to_string()),
                    };
                }
                return Err(ClientError::Connection(e));
            }
        };

        let mut state = self.state.write().await;
        if state.is_closed() {
            drop(state);
            tracing::info!("Client closed during handshake, releasing new connection");
            Link::new(connection, channel, 0).release().await;
            return Err(ClientError::Closed);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let notifier = ClosureNotifier::new(generation, self.closures.clone());
        connection.on_closed(notifier.clone());

        // A link that died before the notifier was registered would never
        // signal, so report it ourselves.
        if !connection.is_open() {
            notifier.notify("connection closed during handshake");
        }

        *state = ConnectionState::Connected(Link::new(connection, channel, generation));
        drop(state);

        RelayMetrics::set_connected(true);
        tracing::info!(generation, "Connected to broker");
        Ok(())
    }

    async fn handshake(
        &self,
    ) -> Result<(Box<dyn BrokerConnection>, Box<dyn BrokerChannel>), BrokerError> {
        let connection = self.broker.connect().await?;

        match connection.open_channel().await {
            Ok(channel) => Ok((connection, channel)),
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::warn!(
                        error = %close_err,
                        "Failed to close connection after channel open failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// Tear down the link a closure signal refers to.
    ///
    /// Returns `false` when the signal is stale (older generation, or the
    /// link was already replaced or closed).
    pub(crate) async fn detach_dropped(&self, closed: &ConnectionClosed) -> bool {
        let link = {
            let mut state = self.state.write().await;
            state.detach(closed.generation, &closed.reason)
        };

        let Some(link) = link else {
            return false;
        };

        RelayMetrics::record_drop();
        RelayMetrics::set_connected(false);
        link.release().await;
        true
    }

    /// Move to `Closed` and release the installed link, if any.
    ///
    /// Returns `false` if the client was already closed.
    pub(crate) async fn shut_down(&self) -> bool {
        let previous = {
            let mut state = self.state.write().await;
            if state.is_closed() {
                return false;
            }
            self.shutdown.send_replace(true);
            std::mem::replace(&mut *state, ConnectionState::Closed)
        };

        RelayMetrics::set_connected(false);

        if let ConnectionState::Connected(link) = previous {
            link.release().await;
        }
        true
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    async fn attempt(&self, publishing: &Publishing) -> AttemptOutcome {
        let state = self.state.read().await;
        let link = match &*state {
            ConnectionState::Connected(link) => link,
            ConnectionState::Closed => return AttemptOutcome::Closed,
            ConnectionState::Connecting | ConnectionState::Disconnected { .. } => {
                return AttemptOutcome::NotConnected;
            }
        };

        RelayMetrics::record_publish_attempt();
        let timeout = self.config.publish.send_timeout;
        match tokio::time::timeout(timeout, link.channel.publish(publishing)).await {
            Ok(Ok(())) => AttemptOutcome::Delivered,
            Ok(Err(e)) => AttemptOutcome::Failed(e),
            Err(_) => AttemptOutcome::Failed(BrokerError::PublishFailed {
                queue: publishing.routing_key.clone(),
                reason: format!("send timed out after {timeout:?}"),
            }),
        }
    }

    async fn probe(&self) -> Result<Option<QueueStatus>, ClientError> {
        let state = self.state.read().await;
        let link = match &*state {
            ConnectionState::Closed => return Err(ClientError::Closed),
            ConnectionState::Connected(link) if link.connection.is_open() => link,
            _ => return Err(ClientError::NotConnected),
        };

        let queue = self.config.queue_name.as_str();
        if queue.is_empty() {
            return Ok(None);
        }

        let timeout = self.config.publish.send_timeout;
        let result = match tokio::time::timeout(timeout, link.channel.inspect_queue(queue)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::InspectFailed {
                queue: queue.to_string(),
                reason: format!("inspection timed out after {timeout:?}"),
            }),
        };

        result
            .map(Some)
            .map_err(|source| ClientError::BrokerUnresponsive {
                queue: queue.to_string(),
                source,
            })
    }
}

/// Resilient publishing client.
///
/// Owns one broker connection plus one channel, keeps them alive with a
/// background supervisor, and publishes JSON payloads with bounded retries.
///
/// # Example
///
/// ```rust,ignore
/// use ticket_relay_runtime::{ClientConfig, RelayClient};
/// use std::sync::Arc;
///
/// let client = RelayClient::new(Arc::new(broker), ClientConfig::new("support_tickets_queue")).await?;
///
/// client.publish("support_tickets_queue", &ticket).await?;
/// assert!(client.is_connected());
///
/// client.close().await;
/// ```
pub struct RelayClient {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl RelayClient {
    /// Connect to the broker and start the reconnection supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] if the initial handshake fails. No
    /// supervisor is started in that case.
    pub async fn new(broker: Arc<dyn Broker>, config: ClientConfig) -> Result<Self, ClientError> {
        let (closures_tx, closures_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            broker,
            config,
            state: RwLock::new(ConnectionState::Connecting),
            generation: AtomicU64::new(0),
            closures: closures_tx,
            shutdown: shutdown_tx,
        });

        if let Err(e) = shared.connect().await {
            tracing::error!(error = %e, "Initial broker connection failed");
            RelayMetrics::set_connected(false);
            return Err(e);
        }

        let supervisor = Supervisor::new(Arc::clone(&shared), closures_rx).spawn();

        tracing::info!(
            queue = %shared.config.queue_name,
            max_attempts = shared.config.publish.attempts(),
            reconnect_delay_ms = shared.config.reconnect.delay.as_millis(),
            "Relay client started"
        );

        Ok(Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// The client's configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Serialize `payload` as JSON and publish it to `queue`.
    ///
    /// The message goes through the default exchange with `queue` as routing
    /// key. Attempts are sequential and bounded by the publish policy.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Serialization`] immediately if encoding fails
    /// - [`ClientError::NotConnected`] if the final attempt found no live channel
    /// - [`ClientError::PublishExhausted`] if the final send failed
    /// - [`ClientError::Closed`] if the client was closed
    ///
    /// A failure does not guarantee the message was never enqueued: a send
    /// can reach the broker before its error is observed.
    pub async fn publish<T>(&self, queue: &str, payload: &T) -> Result<(), ClientError>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).inspect_err(|_| {
            RelayMetrics::record_publish_failure("serialization");
        })?;
        let publishing = Publishing::json(queue, body);
        let policy = self.shared.config.publish;
        let max_attempts = policy.attempts();
        let started = Instant::now();

        let mut attempt = 1;
        loop {
            match self.shared.attempt(&publishing).await {
                AttemptOutcome::Delivered => {
                    RelayMetrics::record_published(started.elapsed());
                    tracing::info!(
                        queue = %queue,
                        attempt,
                        bytes = publishing.body.len(),
                        "Published message"
                    );
                    return Ok(());
                }
                AttemptOutcome::Closed => {
                    RelayMetrics::record_publish_failure("closed");
                    return Err(ClientError::Closed);
                }
                AttemptOutcome::NotConnected => {
                    if attempt >= max_attempts {
                        RelayMetrics::record_publish_failure("not_connected");
                        tracing::error!(
                            queue = %queue,
                            attempts = attempt,
                            "Not connected to broker, giving up"
                        );
                        return Err(ClientError::NotConnected);
                    }
                    tracing::debug!(queue = %queue, attempt, max_attempts, "Not connected, waiting");
                }
                AttemptOutcome::Failed(source) => {
                    tracing::warn!(
                        queue = %queue,
                        attempt,
                        max_attempts,
                        error = %source,
                        "Failed to publish message"
                    );
                    if attempt >= max_attempts {
                        RelayMetrics::record_publish_failure("exhausted");
                        return Err(ClientError::PublishExhausted {
                            attempts: attempt,
                            source,
                        });
                    }
                }
            }

            tokio::time::sleep(policy.retry_delay).await;
            attempt += 1;
        }
    }

    /// Whether the client currently holds an open connection.
    ///
    /// Never blocks and never touches the network. Reads as `false` while a
    /// reconnect is swapping handles.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .state
            .try_read()
            .is_ok_and(|state| state.is_live())
    }

    /// Actively probe the broker by passively inspecting the configured queue.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] if there is no open connection
    /// - [`ClientError::BrokerUnresponsive`] if the inspection fails
    /// - [`ClientError::Closed`] if the client was closed
    ///
    /// Returns `None` when no queue is configured and the inspection was
    /// skipped.
    pub async fn health_check(&self) -> Result<Option<QueueStatus>, ClientError> {
        self.shared.probe().await
    }

    /// Run [`health_check`](Self::health_check) and fold the result into a
    /// [`HealthCheck`] record for probe endpoints.
    pub async fn health(&self) -> HealthCheck {
        match self.health_check().await {
            Ok(Some(status)) => HealthCheck::healthy(HEALTH_COMPONENT)
                .with_metadata("queue", status.name)
                .with_metadata("messages", status.message_count.to_string())
                .with_metadata("consumers", status.consumer_count.to_string()),
            Ok(None) => HealthCheck::healthy(HEALTH_COMPONENT),
            Err(e) => HealthCheck::unhealthy(HEALTH_COMPONENT, e.to_string())
                .with_metadata("reason", e.kind()),
        }
    }

    /// Snapshot of the connection lifecycle.
    pub async fn phase(&self) -> ConnectionPhase {
        self.shared.state.read().await.phase()
    }

    /// Shut the client down.
    ///
    /// Signals the supervisor, releases the channel and the connection, then
    /// waits for the supervisor to exit. A reconnect handshake that is in
    /// flight is allowed to finish and its handles are released. Calling it
    /// again is a no-op.
    pub async fn close(&self) {
        if !self.shared.shut_down().await {
            tracing::debug!("Relay client already closed");
            return;
        }

        let supervisor = self.supervisor.lock().ok().and_then(|mut handle| handle.take());
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Supervisor task ended abnormally");
            }
        }

        tracing::info!("Relay client closed");
    }
}

/// Dropping without [`close`](RelayClient::close) signals the supervisor,
/// which releases the channel and connection before it exits. That needs
/// the runtime to keep running; call `close()` for a teardown you can await.
impl Drop for RelayClient {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}
