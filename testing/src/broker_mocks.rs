//! In-memory broker for testing the relay client.
//!
//! [`InMemoryBroker`] implements the broker traits from `ticket-relay-core`
//! without any network. Tests script failures on it (refused connects,
//! failing publishes, out-of-band drops) and then inspect what the client did.
//!
//! It also detects sends on handles the client has already released, which
//! is how the lock discipline between publishers and reconnects is verified.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Mutex poisoning only happens after a test already panicked

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_relay_core::{
    Broker, BrokerChannel, BrokerConnection, BrokerError, BrokerFuture, ClosureNotifier,
    Publishing, QueueStatus,
};

#[derive(Debug)]
struct BrokerState {
    reachable: bool,
    refuse_connects: u32,
    refuse_channels: u32,
    fail_publishes: u32,
    fail_all_publishes: bool,
    unresponsive: bool,
    publish_latency: Duration,
    connect_latency: Duration,
    queues: HashMap<String, u32>,
    published: Vec<Publishing>,
    connect_attempts: usize,
    publish_attempts: usize,
    use_after_release: usize,
    connections: Vec<Arc<ConnectionCore>>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            reachable: true,
            refuse_connects: 0,
            refuse_channels: 0,
            fail_publishes: 0,
            fail_all_publishes: false,
            unresponsive: false,
            publish_latency: Duration::ZERO,
            connect_latency: Duration::ZERO,
            queues: HashMap::new(),
            published: Vec::new(),
            connect_attempts: 0,
            publish_attempts: 0,
            use_after_release: 0,
            connections: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct ConnectionCore {
    id: usize,
    /// Broker side: false once the link died or was closed.
    open: AtomicBool,
    /// Client side: true once the client called `close()`.
    released: AtomicBool,
    notifier: Mutex<Option<ClosureNotifier>>,
}

impl ConnectionCore {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst)
    }
}

/// Scriptable in-memory broker.
///
/// Cloning shares the underlying state, so a test keeps one clone for
/// scripting and hands another to the client.
///
/// # Example
///
/// ```
/// use ticket_relay_testing::InMemoryBroker;
/// use ticket_relay_core::{Broker, BrokerConnection};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::with_queue("support_tickets_queue");
///
/// let connection = broker.connect().await?;
/// assert!(connection.is_open());
///
/// broker.drop_connection("broker restarted");
/// assert!(!connection.is_open());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Create a reachable broker with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reachable broker with one declared queue.
    #[must_use]
    pub fn with_queue(queue: impl Into<String>) -> Self {
        let broker = Self::new();
        broker.declare_queue(queue);
        broker
    }

    /// Declare a queue so publishes to it are counted and inspections succeed.
    pub fn declare_queue(&self, queue: impl Into<String>) {
        self.state.lock().unwrap().queues.entry(queue.into()).or_insert(0);
    }

    /// Make every connect succeed (`true`) or fail (`false`).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    /// Refuse the next `count` connects, then accept again.
    pub fn refuse_connects(&self, count: u32) {
        self.state.lock().unwrap().refuse_connects = count;
    }

    /// Refuse the next `count` channel opens.
    pub fn refuse_channels(&self, count: u32) {
        self.state.lock().unwrap().refuse_channels = count;
    }

    /// Fail the next `count` publishes with a broker error.
    pub fn fail_publishes(&self, count: u32) {
        self.state.lock().unwrap().fail_publishes = count;
    }

    /// Fail every publish until turned off.
    pub fn fail_all_publishes(&self, fail: bool) {
        self.state.lock().unwrap().fail_all_publishes = fail;
    }

    /// Make queue inspections fail while the connection stays open.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().unwrap().unresponsive = unresponsive;
    }

    /// Delay every publish by `latency` before it takes effect.
    pub fn set_publish_latency(&self, latency: Duration) {
        self.state.lock().unwrap().publish_latency = latency;
    }

    /// Delay every successful connect by `latency`.
    ///
    /// The connection is registered as open on the broker before the delay,
    /// the way a real handshake finishes on the server even if the caller
    /// stops waiting for it.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state.lock().unwrap().connect_latency = latency;
    }

    /// Kill the most recent open connection out-of-band.
    ///
    /// Fires the registered closure notifier. Returns `false` if no
    /// connection was open.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let connection = {
            let state = self.state.lock().unwrap();
            state.connections.iter().rev().find(|c| c.is_open()).cloned()
        };

        let Some(connection) = connection else {
            return false;
        };

        connection.open.store(false, Ordering::SeqCst);
        if let Some(notifier) = connection.notifier.lock().unwrap().as_ref() {
            notifier.notify(reason);
        }
        true
    }

    /// Fire the closure notifier of connection `id` (1-based) again.
    ///
    /// Simulates a late signal from a connection that was already replaced.
    /// Returns `false` if the connection or its notifier does not exist.
    pub fn replay_closure(&self, id: usize, reason: &str) -> bool {
        let connection = {
            let state = self.state.lock().unwrap();
            state.connections.iter().find(|c| c.id == id).cloned()
        };

        connection.is_some_and(|connection| {
            connection
                .notifier
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|notifier| notifier.notify(reason))
        })
    }

    /// Messages the broker accepted, in acceptance order.
    #[must_use]
    pub fn published(&self) -> Vec<Publishing> {
        self.state.lock().unwrap().published.clone()
    }

    /// Number of messages currently sitting in `queue`.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> Option<u32> {
        self.state.lock().unwrap().queues.get(queue).copied()
    }

    /// Number of connect calls, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Number of publish calls that reached a channel.
    #[must_use]
    pub fn publish_attempts(&self) -> usize {
        self.state.lock().unwrap().publish_attempts
    }

    /// Number of sends issued on a channel the client had already released.
    #[must_use]
    pub fn use_after_release(&self) -> usize {
        self.state.lock().unwrap().use_after_release
    }

    /// Number of connections that are open and not released.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .connections
            .iter()
            .filter(|c| c.is_open())
            .count()
    }

    /// Number of connections the client has closed.
    #[must_use]
    pub fn released_connections(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .connections
            .iter()
            .filter(|c| c.released.load(Ordering::SeqCst))
            .count()
    }
}

impl Broker for InMemoryBroker {
    fn connect(&self) -> BrokerFuture<'_, Box<dyn BrokerConnection>> {
        Box::pin(async move {
            let (core, latency) = self.register_connection()?;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            Ok(Box::new(InMemoryConnection {
                core,
                broker: Arc::clone(&self.state),
            }) as Box<dyn BrokerConnection>)
        })
    }
}

impl InMemoryBroker {
    fn register_connection(&self) -> Result<(Arc<ConnectionCore>, Duration), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts += 1;

        if !state.reachable {
            return Err(BrokerError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(BrokerError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        let core = Arc::new(ConnectionCore {
            id: state.connections.len() + 1,
            open: AtomicBool::new(true),
            released: AtomicBool::new(false),
            notifier: Mutex::new(None),
        });
        state.connections.push(Arc::clone(&core));

        Ok((core, state.connect_latency))
    }
}

/// Connection handed out by [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryConnection {
    core: Arc<ConnectionCore>,
    broker: Arc<Mutex<BrokerState>>,
}

impl InMemoryConnection {
    /// Sequence number of this connection (1 for the first connect).
    #[must_use]
    pub fn id(&self) -> usize {
        self.core.id
    }
}

impl BrokerConnection for InMemoryConnection {
    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn open_channel(&self) -> BrokerFuture<'_, Box<dyn BrokerChannel>> {
        Box::pin(async move {
            if !self.core.is_open() {
                return Err(BrokerError::ChannelFailed("connection is closed".to_string()));
            }

            let mut state = self.broker.lock().unwrap();
            if state.refuse_channels > 0 {
                state.refuse_channels -= 1;
                return Err(BrokerError::ChannelFailed(
                    "channel_max reached".to_string(),
                ));
            }

            Ok(Box::new(InMemoryChannel {
                connection: Arc::clone(&self.core),
                released: AtomicBool::new(false),
                broker: Arc::clone(&self.broker),
            }) as Box<dyn BrokerChannel>)
        })
    }

    fn on_closed(&self, notifier: ClosureNotifier) {
        *self.core.notifier.lock().unwrap() = Some(notifier);
    }

    fn close(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            if self.core.released.swap(true, Ordering::SeqCst) {
                return Err(BrokerError::Closed("connection already closed".to_string()));
            }
            self.core.open.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Channel handed out by [`InMemoryConnection`].
#[derive(Debug)]
pub struct InMemoryChannel {
    connection: Arc<ConnectionCore>,
    released: AtomicBool,
    broker: Arc<Mutex<BrokerState>>,
}

impl BrokerChannel for InMemoryChannel {
    fn publish<'a>(&'a self, publishing: &'a Publishing) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let latency = self.broker.lock().unwrap().publish_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = self.broker.lock().unwrap();
            state.publish_attempts += 1;

            if self.released.load(Ordering::SeqCst) {
                state.use_after_release += 1;
                return Err(BrokerError::Closed("channel already closed".to_string()));
            }

            let failure = if !self.connection.is_open() {
                Some("connection closed".to_string())
            } else if state.fail_all_publishes {
                Some("broker rejected publish".to_string())
            } else if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                Some("broker rejected publish".to_string())
            } else {
                None
            };

            if let Some(reason) = failure {
                return Err(BrokerError::PublishFailed {
                    queue: publishing.routing_key.clone(),
                    reason,
                });
            }

            // Default exchange: unroutable, non-mandatory messages vanish.
            if publishing.exchange.is_empty() {
                if let Some(depth) = state.queues.get_mut(&publishing.routing_key) {
                    *depth += 1;
                }
            }
            state.published.push(publishing.clone());
            Ok(())
        })
    }

    fn inspect_queue<'a>(&'a self, queue: &'a str) -> BrokerFuture<'a, QueueStatus> {
        Box::pin(async move {
            let state = self.broker.lock().unwrap();

            if self.released.load(Ordering::SeqCst) {
                return Err(BrokerError::Closed("channel already closed".to_string()));
            }
            if !self.connection.is_open() || state.unresponsive {
                return Err(BrokerError::InspectFailed {
                    queue: queue.to_string(),
                    reason: "broker did not respond".to_string(),
                });
            }

            state.queues.get(queue).map_or_else(
                || {
                    Err(BrokerError::InspectFailed {
                        queue: queue.to_string(),
                        reason: format!("NOT_FOUND - no queue '{queue}'"),
                    })
                },
                |depth| {
                    Ok(QueueStatus {
                        name: queue.to_string(),
                        message_count: *depth,
                        consumer_count: 0,
                    })
                },
            )
        })
    }

    fn close(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            if self.released.swap(true, Ordering::SeqCst) {
                return Err(BrokerError::Closed("channel already closed".to_string()));
            }
            Ok(())
        })
    }
}
