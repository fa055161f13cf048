//! Broker abstraction for publishing tickets to a durable queue.
//!
//! This module provides the [`Broker`], [`BrokerConnection`] and [`BrokerChannel`]
//! traits that the relay client drives. A broker hands out connections, a
//! connection hands out channels, and channels carry publishes and queue
//! inspections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Broker      │  connect()
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Connection    │  is_open(), open_channel(), on_closed(), close()
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Channel      │  publish(), inspect_queue(), close()
//! └─────────────────┘
//! ```
//!
//! # Closure Notification
//!
//! After every successful connect the client registers a [`ClosureNotifier`]
//! with the connection. Implementations fire it when the broker or the network
//! terminates the connection out-of-band. An explicit [`BrokerConnection::close`]
//! must NOT fire it.
//!
//! # Implementations
//!
//! - `InMemoryBroker` (`ticket-relay-testing`) - scriptable broker for tests
//! - `RabbitMqBroker` (`ticket-relay-rabbitmq`) - AMQP 0-9-1 via lapin
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_relay_core::broker::{Broker, Publishing};
//!
//! async fn example(broker: impl Broker) -> Result<(), BrokerError> {
//!     let connection = broker.connect().await?;
//!     let channel = connection.open_channel().await?;
//!
//!     let publishing = Publishing::json("support_tickets_queue", br#"{"ticket_id":"T1"}"#.to_vec());
//!     channel.publish(&publishing).await?;
//!
//!     channel.close().await?;
//!     connection.close().await
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Content type attached to every JSON publish.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors reported by broker implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The connection handshake failed (network, auth, broker down)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A channel could not be opened on an established connection
    #[error("Failed to open channel: {0}")]
    ChannelFailed(String),

    /// The broker rejected or failed to accept a publish
    #[error("Publish failed for queue '{queue}': {reason}")]
    PublishFailed {
        /// Routing key the message was addressed to
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// A passive queue inspection failed
    #[error("Inspection failed for queue '{queue}': {reason}")]
    InspectFailed {
        /// Queue that was inspected
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// The handle is already closed
    #[error("Handle closed: {0}")]
    Closed(String),
}

/// Boxed future returned by broker trait methods.
///
/// Trait methods return `Pin<Box<dyn Future>>` instead of `async fn` so the
/// traits stay dyn compatible (`Arc<dyn Broker>`).
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// A single message addressed to the broker.
///
/// Exchange, routing key and the `mandatory`/`immediate` flags follow the
/// AMQP `basic.publish` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publishing {
    /// Exchange name (empty string is the default direct exchange)
    pub exchange: String,
    /// Routing key (the destination queue name for the default exchange)
    pub routing_key: String,
    /// Ask the broker to return unroutable messages
    pub mandatory: bool,
    /// Ask the broker to return messages that cannot be consumed immediately
    pub immediate: bool,
    /// MIME content type of `body`
    pub content_type: String,
    /// Message body
    pub body: Vec<u8>,
}

impl Publishing {
    /// Build a direct-to-queue JSON publish.
    ///
    /// Uses the default exchange with `queue` as routing key. The message is
    /// neither mandatory nor immediate, so the broker drops it silently if the
    /// queue does not exist.
    #[must_use]
    pub fn json(queue: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            exchange: String::new(),
            routing_key: queue.into(),
            mandatory: false,
            immediate: false,
            content_type: JSON_CONTENT_TYPE.to_string(),
            body,
        }
    }
}

/// Result of a passive queue inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queue name
    pub name: String,
    /// Number of ready messages
    pub message_count: u32,
    /// Number of active consumers
    pub consumer_count: u32,
}

/// Notification that a connection terminated out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClosed {
    /// Generation of the connection that closed
    pub generation: u64,
    /// Broker- or transport-reported reason
    pub reason: String,
}

/// Sender half of the closure signal, stamped with a connection generation.
///
/// The client creates one per connect. Implementations keep it alongside the
/// connection and call [`ClosureNotifier::notify`] when the link dies.
#[derive(Debug, Clone)]
pub struct ClosureNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectionClosed>,
}

impl ClosureNotifier {
    /// Create a notifier for the given connection generation.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::UnboundedSender<ConnectionClosed>) -> Self {
        Self { generation, tx }
    }

    /// Generation this notifier is bound to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Signal that the connection closed.
    ///
    /// Returns `false` if nobody is listening anymore (client shut down).
    pub fn notify(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(ConnectionClosed {
                generation: self.generation,
                reason: reason.into(),
            })
            .is_ok()
    }
}

/// Entry point to a message broker.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the initial connect runs on the
/// caller's task and every reconnect runs on the supervisor task.
pub trait Broker: Send + Sync {
    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the broker is unreachable,
    /// rejects the credentials, or the URL is invalid.
    fn connect(&self) -> BrokerFuture<'_, Box<dyn BrokerConnection>>;
}

/// A live connection to the broker.
pub trait BrokerConnection: Send + Sync {
    /// Whether the connection still reports itself open.
    ///
    /// Must not block or touch the network.
    fn is_open(&self) -> bool;

    /// Open a channel over this connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelFailed`] if the broker refuses the channel.
    fn open_channel(&self) -> BrokerFuture<'_, Box<dyn BrokerChannel>>;

    /// Register the closure notifier for this connection.
    ///
    /// Replaces any previously registered notifier.
    fn on_closed(&self, notifier: ClosureNotifier);

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Closed`] if the connection was already gone.
    fn close(&self) -> BrokerFuture<'_, ()>;
}

/// A channel over a [`BrokerConnection`].
pub trait BrokerChannel: Send + Sync {
    /// Publish one message.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] if the frame could not be sent.
    fn publish<'a>(&'a self, publishing: &'a Publishing) -> BrokerFuture<'a, ()>;

    /// Passively inspect a queue without consuming from it.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InspectFailed`] if the queue does not exist or the
    /// broker does not answer.
    fn inspect_queue<'a>(&'a self, queue: &'a str) -> BrokerFuture<'a, QueueStatus>;

    /// Close the channel.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Closed`] if the channel was already gone.
    fn close(&self) -> BrokerFuture<'_, ()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_publishing_targets_default_exchange() {
        let publishing = Publishing::json("support_tickets_queue", b"{}".to_vec());

        assert_eq!(publishing.exchange, "");
        assert_eq!(publishing.routing_key, "support_tickets_queue");
        assert!(!publishing.mandatory);
        assert!(!publishing.immediate);
        assert_eq!(publishing.content_type, JSON_CONTENT_TYPE);
    }

    #[test]
    fn notifier_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = ClosureNotifier::new(7, tx);

        assert!(notifier.notify("connection reset by peer"));

        let closed = rx.try_recv().unwrap();
        assert_eq!(closed.generation, 7);
        assert_eq!(closed.reason, "connection reset by peer");
    }

    #[test]
    fn notifier_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = ClosureNotifier::new(1, tx);
        drop(rx);

        assert!(!notifier.notify("gone"));
    }

    #[test]
    fn broker_error_messages_carry_cause() {
        let err = BrokerError::PublishFailed {
            queue: "q".to_string(),
            reason: "channel closed".to_string(),
        };
        assert_eq!(err.to_string(), "Publish failed for queue 'q': channel closed");
    }
}
